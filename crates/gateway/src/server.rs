use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    graphpush_config::GraphpushConfig,
    graphpush_graphql::{EventBus, SessionContext, demo_engine},
    graphpush_server::LocalConnections,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use crate::{graphql_routes::graphql_post_handler, state::GatewayState, ws::handle_connection};

// ── App ──────────────────────────────────────────────────────────────────────

pub fn build_gateway_app(state: Arc<GatewayState>, config: &GraphpushConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(&config.server.ws_path, get(ws_upgrade_handler))
        .route(&config.server.graphql_path, post(graphql_post_handler))
        .layer(cors)
        .with_state(state)
}

/// Gateway state serving the demo schema, with the configured limits.
pub fn demo_state(config: &GraphpushConfig) -> Arc<GatewayState> {
    let connections = Arc::new(LocalConnections::new());
    let router = graphpush_server::Router::new(demo_engine(EventBus::default()), connections.clone())
        .with_context_builder(SessionContext)
        .with_max_subscriptions(config.limits.max_subscriptions_per_connection);
    GatewayState::new(
        Arc::new(router),
        connections,
        config.limits.max_payload_bytes,
    )
}

// ── Server startup ───────────────────────────────────────────────────────────

pub async fn start_gateway(config: GraphpushConfig) -> anyhow::Result<()> {
    let state = demo_state(&config);
    let app = build_gateway_app(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!(
        addr = %addr,
        ws_path = %config.server.ws_path,
        graphql_path = %config.server.graphql_path,
        "gateway listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "connections": state.client_count(),
        "uptimeMs": state.uptime_ms(),
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    let max_message_size = state.max_payload_bytes.saturating_mul(2);
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_connection(socket, state, addr))
}
