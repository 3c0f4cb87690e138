//! One-shot queries over HTTP.

use {
    graphpush_protocol::{HttpResponseBody, RequestEnvelope},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::Error;

/// Sends queries and mutations to the gateway's HTTP route.
///
/// Cookies set by the server are kept and sent back on later calls.
#[derive(Clone)]
pub struct HttpClient {
    url: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(url: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Run `query` and return its `data`.
    ///
    /// Any GraphQL error fails the call with [`Error::GraphQL`], even when
    /// partial data came back.
    pub async fn query(
        &self,
        query: impl Into<String>,
        variables: Option<Map<String, Value>>,
    ) -> Result<Value, Error> {
        let envelope = RequestEnvelope {
            query: Some(query.into()),
            variables,
            ..Default::default()
        };
        self.request(&envelope).await
    }

    pub async fn request(&self, envelope: &RequestEnvelope) -> Result<Value, Error> {
        let response = self.client.post(&self.url).json(envelope).send().await?;
        let status = response.status();
        let body: HttpResponseBody = response.json().await?;
        debug!(url = %self.url, %status, errors = body.errors.len(), "query answered");

        if !body.errors.is_empty() {
            return Err(Error::GraphQL(body.errors));
        }
        Ok(body.data.unwrap_or(Value::Null))
    }
}

/// Convenience for a single call without keeping a client around.
pub async fn query(
    url: &str,
    query: impl Into<String>,
    variables: Option<Map<String, Value>>,
) -> Result<Value, Error> {
    HttpClient::new(url)?.query(query, variables).await
}
