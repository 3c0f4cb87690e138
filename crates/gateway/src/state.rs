use std::{sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    graphpush_server::{
        ContextBuilder, Engine, HandlerResponse, InboundEvent, LocalConnections, Router,
    },
};

/// What the gateway needs from the request router, with the engine erased.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, event: InboundEvent) -> HandlerResponse;

    /// The connection is gone; end whatever it still has running.
    fn disconnect(&self, connection_id: &str) -> usize;
}

#[async_trait]
impl<E, B> RequestHandler for Router<E, B>
where
    E: Engine,
    B: ContextBuilder<E::Context>,
{
    async fn handle(&self, event: InboundEvent) -> HandlerResponse {
        Router::handle(self, event).await
    }

    fn disconnect(&self, connection_id: &str) -> usize {
        Router::disconnect(self, connection_id)
    }
}

/// Shared gateway state.
pub struct GatewayState {
    pub handler: Arc<dyn RequestHandler>,
    /// Open WebSocket connections, also the router's transport.
    pub connections: Arc<LocalConnections>,
    /// Text frames above this size are answered with an error and dropped.
    pub max_payload_bytes: usize,
    pub version: String,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(
        handler: Arc<dyn RequestHandler>,
        connections: Arc<LocalConnections>,
        max_payload_bytes: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler,
            connections,
            max_payload_bytes,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
