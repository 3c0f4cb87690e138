use graphpush_protocol::GraphQLError;

/// Errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection closed")]
    Closed,

    #[error("{}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// GraphQL errors carried by this error, if any.
    pub fn graphql_errors(&self) -> &[GraphQLError] {
        match self {
            Self::GraphQL(errors) => errors,
            _ => &[],
        }
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
