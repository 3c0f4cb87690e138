use {
    anyhow::{Context, Result, bail},
    clap::Args,
    graphpush_client::{Client, HttpClient},
    graphpush_config::ClientConfig,
    graphpush_protocol::RequestEnvelope,
    serde_json::{Map, Value},
    tracing::{debug, info},
};

#[derive(Args)]
pub struct SubscribeArgs {
    /// Gateway WebSocket URL (defaults to `client.ws_url`).
    #[arg(long)]
    url: Option<String>,
    /// Subscription document.
    #[arg(short, long)]
    query: String,
    /// Variables as a JSON object.
    #[arg(long)]
    variables: Option<String>,
    /// Operation to run when the document has several.
    #[arg(long)]
    operation_name: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Gateway GraphQL endpoint (defaults to `client.http_url`).
    #[arg(long)]
    url: Option<String>,
    /// Query or mutation document.
    #[arg(short, long)]
    query: String,
    /// Variables as a JSON object.
    #[arg(long)]
    variables: Option<String>,
}

pub async fn subscribe(args: SubscribeArgs, defaults: &ClientConfig) -> Result<()> {
    let url = args.url.unwrap_or_else(|| defaults.ws_url.clone());
    let variables = parse_variables(args.variables.as_deref())?;

    let client = Client::websocket(url.clone());
    let envelope = RequestEnvelope {
        query: Some(args.query),
        variables,
        operation_name: args.operation_name,
        ..Default::default()
    };
    let mut subscription = client
        .subscribe_request(envelope)
        .await
        .with_context(|| format!("failed to subscribe via {url}"))?;
    info!(subscription_id = %subscription.id(), "subscribed");

    loop {
        tokio::select! {
            item = subscription.next() => match item {
                Some(Ok(data)) => println!("{}", serde_json::to_string(&data)?),
                Some(Err(e)) => bail!("subscription failed: {e}"),
                None => {
                    debug!("subscription completed");
                    return Ok(());
                },
            },
            _ = tokio::signal::ctrl_c() => {
                info!(subscription_id = %subscription.id(), "interrupted, cancelling");
                subscription.cancel();
                return Ok(());
            },
        }
    }
}

pub async fn query(args: QueryArgs, defaults: &ClientConfig) -> Result<()> {
    let url = args.url.unwrap_or_else(|| defaults.http_url.clone());
    let variables = parse_variables(args.variables.as_deref())?;

    let data = HttpClient::new(url)?.query(args.query, variables).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn parse_variables(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(raw).context("--variables is not valid JSON")? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => bail!("--variables must be a JSON object, got {other}"),
    }
}
