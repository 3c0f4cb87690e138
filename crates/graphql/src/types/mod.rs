//! Output types of the demo schema.

use {async_graphql::SimpleObject, serde_json::Value};

/// A message published on a topic.
#[derive(Debug, Clone, SimpleObject)]
pub struct Event {
    pub topic: String,
    /// Arbitrary JSON.
    pub payload: async_graphql::Json<Value>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload: async_graphql::Json(payload),
        }
    }
}
