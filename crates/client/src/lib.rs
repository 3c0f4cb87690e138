//! Client half of GraphQL over a push-style WebSocket gateway.
//!
//! [`Client`] multiplexes many subscriptions over one shared connection,
//! tagging each request with a fresh correlation id and routing the pushed
//! frames back to the matching [`Subscription`]. [`HttpClient`] covers the
//! one-shot request/response path.

pub mod client;
pub mod connection;
pub mod error;
pub mod http;

pub use {
    client::{Client, Subscription, SubscriptionItem},
    connection::{Connector, Duplex, WebSocketConnector},
    error::Error,
    http::{HttpClient, query},
};
