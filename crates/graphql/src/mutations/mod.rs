//! GraphQL mutation resolvers.

use async_graphql::{Context, Json, Object, Result};

use crate::{context::EventBus, types::Event};

/// Root mutation type.
#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Publish `payload` on `topic`. Returns how many live `events`
    /// subscriptions received it.
    async fn publish(
        &self,
        ctx: &Context<'_>,
        topic: String,
        payload: Json<serde_json::Value>,
    ) -> Result<i32> {
        let bus = ctx.data::<EventBus>()?;
        let delivered = bus.publish(Event::new(topic, payload.0));
        Ok(i32::try_from(delivered).unwrap_or(i32::MAX))
    }
}
