//! Subscription multiplexer over one shared connection.
//!
//! Every subscription gets a fresh correlation id and its own queue channel.
//! A single reader task per connection routes inbound frames to the channel
//! registered under the frame's id.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use {
    futures::Stream,
    graphpush_common::{QueueReceiver, QueueSender, channel},
    graphpush_protocol::{RequestEnvelope, RequestKind, ResponseFrame},
    serde_json::{Map, Value},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    Error,
    connection::{Connector, Duplex, WebSocketConnector},
};

/// One item of a subscription: the `data` of a frame, or the errors it
/// carried.
pub type SubscriptionItem = Result<Value, Error>;

// ── Connection state ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Table {
    channels: HashMap<String, QueueSender<SubscriptionItem>>,
    /// Set once the reader is gone; nothing may register after that.
    closed: bool,
}

/// One live shared connection and its multiplexer table.
struct Shared {
    outbound: mpsc::UnboundedSender<String>,
    table: Mutex<Table>,
}

impl Shared {
    fn is_open(&self) -> bool {
        !self.outbound.is_closed() && !self.table.lock().unwrap_or_else(|e| e.into_inner()).closed
    }

    /// Register a channel under an id unused on this connection.
    fn register(&self, tx: QueueSender<SubscriptionItem>) -> Result<String, Error> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.closed {
            return Err(Error::Closed);
        }
        let mut id = uuid::Uuid::new_v4().to_string();
        while table.channels.contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }
        table.channels.insert(id.clone(), tx);
        Ok(id)
    }

    fn remove(&self, id: &str) -> Option<QueueSender<SubscriptionItem>> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .channels
            .remove(id)
    }

    fn live(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .channels
            .len()
    }

    /// Route one inbound frame.
    fn dispatch(&self, raw: &str) {
        let frame: ResponseFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "discarding unparseable frame");
                return;
            },
        };
        let Some(id) = frame.id.as_deref() else {
            debug!("discarding frame without id");
            return;
        };

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = table.channels.get(id) else {
            debug!(subscription_id = %id, "discarding frame for unknown id");
            return;
        };
        if !frame.errors.is_empty() {
            tx.push(Err(Error::GraphQL(frame.errors)));
        }
        if !frame.done {
            if let Some(data) = frame.data {
                tx.push(Ok(data));
            }
        } else if let Some(tx) = table.channels.remove(id) {
            tx.close();
        }
    }

    /// The connection is gone: end every subscription.
    fn close_all(&self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.closed = true;
        let pending = table.channels.len();
        for (_, tx) in table.channels.drain() {
            tx.close();
        }
        if pending > 0 {
            info!(pending, "connection lost, subscriptions closed");
        }
    }

    fn send(&self, envelope: &RequestEnvelope) -> Result<(), Error> {
        let json = serde_json::to_string(envelope)?;
        self.outbound.send(json).map_err(|_| Error::Closed)
    }
}

async fn read_frames(shared: Arc<Shared>, mut inbound: mpsc::UnboundedReceiver<String>) {
    while let Some(raw) = inbound.recv().await {
        shared.dispatch(&raw);
    }
    shared.close_all();
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Multiplexes any number of subscriptions over one lazily opened
/// connection.
///
/// Concurrent callers share a single connection attempt. A connection that
/// died is replaced on the next call.
pub struct Client {
    connector: Arc<dyn Connector>,
    current: tokio::sync::Mutex<Option<Arc<Shared>>>,
}

impl Client {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Client for a push gateway at `url` (`ws://` or `wss://`).
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::new(Arc::new(WebSocketConnector::new(url)))
    }

    /// Subscribe to `query` with `variables`.
    pub async fn subscribe(
        &self,
        query: impl Into<String>,
        variables: Option<Map<String, Value>>,
    ) -> Result<Subscription, Error> {
        let envelope = RequestEnvelope {
            query: Some(query.into()),
            variables,
            ..Default::default()
        };
        self.subscribe_request(envelope).await
    }

    /// Start the operation in `envelope`. Its `id` is replaced by a fresh
    /// correlation id.
    pub async fn subscribe_request(
        &self,
        mut envelope: RequestEnvelope,
    ) -> Result<Subscription, Error> {
        let shared = self.connection().await?;
        let (tx, rx) = channel();
        let id = shared.register(tx)?;

        envelope.kind = RequestKind::Start;
        envelope.id = Some(id.clone());
        if let Err(e) = shared.send(&envelope) {
            shared.remove(&id);
            return Err(e);
        }
        debug!(subscription_id = %id, "subscription sent");

        Ok(Subscription { id, rx, shared })
    }

    /// Live subscriptions on the current connection.
    pub async fn live_subscriptions(&self) -> usize {
        match self.current.lock().await.as_ref() {
            Some(shared) if shared.is_open() => shared.live(),
            _ => 0,
        }
    }

    async fn connection(&self) -> Result<Arc<Shared>, Error> {
        let mut current = self.current.lock().await;
        if let Some(shared) = current.as_ref()
            && shared.is_open()
        {
            return Ok(Arc::clone(shared));
        }

        let Duplex { outbound, inbound } = self.connector.connect().await?;
        let shared = Arc::new(Shared {
            outbound,
            table: Mutex::new(Table::default()),
        });
        tokio::spawn(read_frames(Arc::clone(&shared), inbound));
        *current = Some(Arc::clone(&shared));
        Ok(shared)
    }
}

// ── Subscription ─────────────────────────────────────────────────────────────

/// Results of one subscription, in arrival order.
///
/// Ends after the terminal frame or when the connection is lost. Dropping it
/// early cancels the operation on the server.
pub struct Subscription {
    id: String,
    rx: QueueReceiver<SubscriptionItem>,
    shared: Arc<Shared>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next result, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<SubscriptionItem> {
        self.rx.next().await
    }

    /// Stop the subscription. Equivalent to dropping it.
    pub fn cancel(self) {}
}

impl Stream for Subscription {
    type Item = SubscriptionItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Still registered means the server has not sent the terminal frame.
        if self.shared.remove(&self.id).is_some() {
            debug!(subscription_id = %self.id, "cancelling subscription");
            let _ = self.shared.send(&RequestEnvelope::cancel(self.id.clone()));
        }
    }
}
