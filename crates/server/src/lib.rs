//! Server half of GraphQL over a push-style WebSocket gateway.
//!
//! The gateway invokes [`Router::handle`] once per inbound frame. Single-result
//! operations are answered immediately; subscriptions are handed to a
//! [`SubscriptionBridge`] which drains the engine's result stream and pushes
//! every item back through the gateway's "send to connection" primitive
//! ([`Transport`]), ending each subscription with exactly one `done: true`
//! frame.
//!
//! The GraphQL engine itself is consumed through the [`Engine`] capability
//! trait; `graphpush-graphql` provides an async-graphql implementation.

pub mod bridge;
pub mod context;
pub mod engine;
pub mod error;
pub mod registry;
pub mod router;
pub mod transport;

pub use {
    bridge::{BridgeOutcome, BridgeReport, ErrorFormatter, SubscriptionBridge},
    context::{ContextBuilder, ContextRequest, DefaultContext, InboundEvent, ResponseHeaders},
    engine::{
        Engine, ExecuteOptions, ExecutionResult, OperationKind, ResultStream, SubscribeOutcome,
    },
    error::{Error, TransportError},
    registry::{Registration, SubscriptionRegistry},
    router::{HandlerResponse, RequestOutcome, Router},
    transport::{LocalConnections, Transport, encode_frame},
};
