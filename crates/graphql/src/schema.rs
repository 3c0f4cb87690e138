//! Schema construction and type aliases.

use {async_graphql::Schema, std::sync::Arc};

use crate::{
    context::EventBus, engine::AsyncGraphqlEngine, mutations::MutationRoot, queries::QueryRoot,
    subscriptions::SubscriptionRoot,
};

/// The demo schema type.
pub type DemoSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Engine over the demo schema.
pub type DemoEngine = AsyncGraphqlEngine<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the demo schema around `bus`.
///
/// The bus is schema data: `publish` writes to it and every `events`
/// subscription reads from it.
pub fn build_schema(bus: EventBus) -> DemoSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(bus)
        .finish()
}

/// Demo schema wrapped as an engine, ready for a router.
pub fn demo_engine(bus: EventBus) -> Arc<DemoEngine> {
    Arc::new(AsyncGraphqlEngine::new(build_schema(bus)))
}
