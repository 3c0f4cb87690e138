//! The gateway's "send to connection" primitive.

use std::{collections::HashMap, sync::RwLock};

use {
    async_trait::async_trait, graphpush_protocol::ResponseFrame, tokio::sync::mpsc, tracing::debug,
};

use crate::error::TransportError;

/// Push one serialized frame to a connection.
///
/// Fire-and-forget from the caller's point of view, but a failure (typically
/// the connection no longer exists) must be reported so the caller can stop
/// producing for that peer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, connection_id: &str, payload: String) -> Result<(), TransportError>;
}

/// Serialize a frame for the wire.
pub fn encode_frame(frame: &ResponseFrame) -> String {
    serde_json::to_string(frame).unwrap_or_else(|e| {
        // Only reachable with non-string map keys inside `data`.
        serde_json::json!({
            "id": frame.id,
            "errors": [{ "message": format!("failed to encode frame: {e}") }],
            "done": frame.done,
        })
        .to_string()
    })
}

/// In-process connection table.
///
/// Each open connection owns the receiving end of an unbounded channel; a
/// writer task drains it onto the socket. Sending to a connection that was
/// never opened, or whose receiver is gone, fails with
/// [`TransportError::Gone`].
#[derive(Default)]
pub struct LocalConnections {
    senders: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl LocalConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the stream of frames pushed to it.
    pub fn open(&self, connection_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection_id.to_string(), tx);
        rx
    }

    /// Forget a connection. Later sends to it fail.
    pub fn close(&self, connection_id: &str) -> bool {
        self.senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(connection_id)
            .is_some()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.senders.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Transport for LocalConnections {
    async fn send(&self, connection_id: &str, payload: String) -> Result<(), TransportError> {
        let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = senders.get(connection_id) else {
            return Err(TransportError::Gone(connection_id.to_string()));
        };
        if sender.send(payload).is_err() {
            debug!(conn_id = %connection_id, "writer dropped, connection gone");
            return Err(TransportError::Gone(connection_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn delivers_to_open_connection() {
        let conns = LocalConnections::new();
        let mut rx = conns.open("c1");
        conns.send("c1", "hello".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn unknown_connection_is_gone() {
        let conns = LocalConnections::new();
        let err = conns.send("nope", "x".into()).await.unwrap_err();
        assert!(matches!(err, TransportError::Gone(id) if id == "nope"));
    }

    #[tokio::test]
    async fn closed_or_dropped_connection_is_gone() {
        let conns = LocalConnections::new();
        let _rx = conns.open("c1");
        assert!(conns.close("c1"));
        assert!(conns.send("c1", "x".into()).await.is_err());

        let rx = conns.open("c2");
        drop(rx);
        assert!(conns.send("c2", "x".into()).await.is_err());
        assert!(conns.contains("c2"));
    }

    #[test]
    fn encode_frame_matches_wire_shape() {
        let json = encode_frame(&ResponseFrame::complete(Some("x".into())));
        assert_eq!(json, r#"{"id":"x","errors":[],"done":true}"#);
    }
}
