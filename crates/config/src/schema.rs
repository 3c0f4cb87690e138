/// Config schema types (server, limits, client).
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphpushConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub client: ClientConfig,
}

/// Local push gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// Route accepting WebSocket upgrades.
    pub ws_path: String,
    /// Route accepting one-shot `POST` queries.
    pub graphql_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 4350,
            ws_path: "/ws".into(),
            graphql_path: "/graphql".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Inbound frames larger than this are rejected without being routed.
    pub max_payload_bytes: usize,
    /// Live subscriptions allowed per connection. `0` disables the limit.
    pub max_subscriptions_per_connection: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: graphpush_protocol::MAX_PAYLOAD_BYTES,
            max_subscriptions_per_connection: 100,
        }
    }
}

/// Defaults for the `subscribe` and `query` commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub ws_url: String,
    pub http_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:4350/ws".into(),
            http_url: "http://127.0.0.1:4350/graphql".into(),
        }
    }
}
