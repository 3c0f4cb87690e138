//! GraphQL query resolvers.

use async_graphql::{Context, Object};

use crate::context::Session;

/// Root query type.
#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Greeting, optionally addressed to `name`.
    async fn hello(&self, name: Option<String>) -> String {
        format!("Hello, {}!", name.as_deref().unwrap_or("world"))
    }

    /// Session id resolved from the request cookies, if any.
    async fn session(&self, ctx: &Context<'_>) -> Option<String> {
        ctx.data_opt::<Session>().map(|s| s.0.clone())
    }
}
