//! Schema-level data and per-request context for the demo schema.

use {
    async_graphql::Data,
    async_trait::async_trait,
    graphpush_protocol::GraphQLError,
    graphpush_server::{ContextBuilder, ContextRequest},
    tokio::sync::broadcast,
};

use crate::types::Event;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Fan-out channel behind the `events` subscription and `publish` mutation.
///
/// Installed as schema data, so every request shares the same bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Session id of the caller, inserted into request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(pub String);

/// Resolves the caller's session from the `session` cookie.
///
/// A caller without one gets a fresh id and a `Set-Cookie` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext;

#[async_trait]
impl ContextBuilder<Data> for SessionContext {
    async fn build(&self, request: ContextRequest<'_>) -> Result<Data, GraphQLError> {
        let session = match request.cookies.get(SESSION_COOKIE) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                request.response_headers.append(
                    "set-cookie",
                    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly"),
                );
                id
            },
        };
        let mut data = Data::default();
        data.insert(Session(session));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        super::*,
        graphpush_server::{InboundEvent, ResponseHeaders},
    };

    #[tokio::test]
    async fn existing_session_cookie_is_reused() {
        let event = InboundEvent::http("{}").with_header("cookie", "session=s-1; theme=dark");
        let mut headers = ResponseHeaders::default();
        SessionContext
            .build(ContextRequest {
                event: &event,
                cookies: event.cookies(),
                response_headers: &mut headers,
            })
            .await
            .unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn missing_session_sets_cookie() {
        let event = InboundEvent::http("{}");
        let mut headers = ResponseHeaders::default();
        SessionContext
            .build(ContextRequest {
                event: &event,
                cookies: event.cookies(),
                response_headers: &mut headers,
            })
            .await
            .unwrap();
        let (name, value) = headers.iter().next().unwrap();
        assert_eq!(name, "set-cookie");
        assert!(value.starts_with("session="));
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(Event::new("t", serde_json::json!(1))), 0);
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(Event::new("t", serde_json::json!(2))), 1);
        assert_eq!(rx.try_recv().unwrap().topic, "t");
    }
}
