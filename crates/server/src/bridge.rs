//! Drains a subscription's result stream into pushed frames.

use std::sync::Arc;

use {
    futures::StreamExt,
    graphpush_protocol::{GraphQLError, ResponseFrame, error_codes},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    engine::{ExecutionResult, ResultStream},
    transport::{Transport, encode_frame},
};

/// Applied to every error before it leaves the server.
pub type ErrorFormatter = Arc<dyn Fn(GraphQLError) -> GraphQLError + Send + Sync>;

pub(crate) fn identity_formatter() -> ErrorFormatter {
    Arc::new(|e: GraphQLError| e)
}

/// How a bridged subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The stream ran out; a `complete` frame was sent.
    Completed,
    /// The stream yielded a terminal error; a failure frame was sent.
    Failed,
    /// Cancelled by the client or by disconnect; a `complete` frame was
    /// attempted.
    Cancelled,
    /// A send failed. The stream was dropped and nothing more was sent.
    PeerGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeReport {
    pub outcome: BridgeOutcome,
    /// Non-terminal frames delivered.
    pub frames_sent: usize,
}

/// Pushes one subscription's results to one connection under one id.
pub struct SubscriptionBridge {
    transport: Arc<dyn Transport>,
    connection_id: String,
    id: String,
    format_error: ErrorFormatter,
}

impl SubscriptionBridge {
    pub fn new(
        transport: Arc<dyn Transport>,
        connection_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            connection_id: connection_id.into(),
            id: id.into(),
            format_error: identity_formatter(),
        }
    }

    #[must_use]
    pub fn with_error_formatter(mut self, format_error: ErrorFormatter) -> Self {
        self.format_error = format_error;
        self
    }

    /// Pull `stream` until it ends, fails, is cancelled or the peer goes away.
    ///
    /// Exactly one `done: true` frame is sent unless the transport fails
    /// first. The stream is dropped before the terminal frame goes out.
    pub async fn run(&self, mut stream: ResultStream, cancel: CancellationToken) -> BridgeReport {
        let mut frames_sent = 0;

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            };

            let frame = match step {
                None => {
                    drop(stream);
                    debug!(conn_id = %self.connection_id, subscription_id = %self.id, "subscription cancelled");
                    self.terminal(ResponseFrame::complete(Some(self.id.clone())))
                        .await;
                    return self.report(BridgeOutcome::Cancelled, frames_sent);
                },
                Some(None) => {
                    drop(stream);
                    let delivered = self
                        .terminal(ResponseFrame::complete(Some(self.id.clone())))
                        .await;
                    let outcome = if delivered {
                        BridgeOutcome::Completed
                    } else {
                        BridgeOutcome::PeerGone
                    };
                    return self.report(outcome, frames_sent);
                },
                Some(Some(Err(error))) => {
                    drop(stream);
                    let mut error = (self.format_error)(error);
                    if error.code().is_none() {
                        error.set_code(error_codes::SUBSCRIPTION_FAILED);
                    }
                    warn!(conn_id = %self.connection_id, subscription_id = %self.id, error = %error, "subscription stream failed");
                    let delivered = self
                        .terminal(ResponseFrame::failure(Some(self.id.clone()), vec![error]))
                        .await;
                    let outcome = if delivered {
                        BridgeOutcome::Failed
                    } else {
                        BridgeOutcome::PeerGone
                    };
                    return self.report(outcome, frames_sent);
                },
                Some(Some(Ok(result))) => self.next_frame(result),
            };

            if let Err(e) = self
                .transport
                .send(&self.connection_id, encode_frame(&frame))
                .await
            {
                drop(stream);
                warn!(conn_id = %self.connection_id, subscription_id = %self.id, error = %e, "push failed, dropping subscription");
                return self.report(BridgeOutcome::PeerGone, frames_sent);
            }
            frames_sent += 1;
        }
    }

    fn next_frame(&self, result: ExecutionResult) -> ResponseFrame {
        let errors = result
            .errors
            .into_iter()
            .map(|e| (self.format_error)(e))
            .collect();
        ResponseFrame::next(Some(self.id.clone()), result.data, errors)
    }

    async fn terminal(&self, frame: ResponseFrame) -> bool {
        match self
            .transport
            .send(&self.connection_id, encode_frame(&frame))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(conn_id = %self.connection_id, subscription_id = %self.id, error = %e, "terminal frame not delivered");
                false
            },
        }
    }

    fn report(&self, outcome: BridgeOutcome, frames_sent: usize) -> BridgeReport {
        debug!(conn_id = %self.connection_id, subscription_id = %self.id, ?outcome, frames_sent, "bridge finished");
        BridgeReport {
            outcome,
            frames_sent,
        }
    }
}
