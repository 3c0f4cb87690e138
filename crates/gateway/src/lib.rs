//! Gateway: local stand-in for a push-style serverless WebSocket gateway.
//!
//! Lifecycle:
//! 1. Load config, build the engine and the request router
//! 2. Bind the HTTP server (health, one-shot `POST` queries)
//! 3. Attach the WebSocket upgrade handler
//!
//! Every inbound text frame becomes one independent [`RequestHandler::handle`]
//! invocation tagged with the connection id; frames pushed back by the router
//! travel through [`graphpush_server::LocalConnections`] to a per-connection
//! writer task.

pub mod graphql_routes;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    server::{build_gateway_app, demo_state, start_gateway},
    state::{GatewayState, RequestHandler},
};
