//! GraphQL execution for graphpush, backed by async-graphql.
//!
//! [`AsyncGraphqlEngine`] adapts any `async_graphql::Schema` to the
//! [`Engine`](graphpush_server::Engine) capability the router consumes. The
//! rest of the crate is a small demo schema (`hello`, `counter`, `events`,
//! `publish`) used by `graphpush serve` and the end-to-end tests.

pub mod context;
pub mod engine;
pub mod error;
pub mod mutations;
pub mod queries;
pub mod schema;
pub mod subscriptions;
pub mod types;

pub use {
    context::{EventBus, Session, SessionContext},
    engine::AsyncGraphqlEngine,
    schema::{DemoEngine, DemoSchema, build_schema, demo_engine},
};
