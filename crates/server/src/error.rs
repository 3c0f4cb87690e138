/// Failure of the push-transport primitive.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection {0} is gone")]
    Gone(String),

    #[error("send to connection {connection_id} failed: {reason}")]
    Send {
        connection_id: String,
        reason: String,
    },
}

/// Errors raised by the server-side subscription machinery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("subscription '{id}' is already live on connection {connection_id}")]
    DuplicateSubscription { connection_id: String, id: String },

    #[error("connection {connection_id} reached the limit of {limit} live subscriptions")]
    SubscriptionLimit { connection_id: String, limit: usize },

    #[error("subscription '{id}' on connection {connection_id} was cancelled before it started")]
    Cancelled { connection_id: String, id: String },

    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
