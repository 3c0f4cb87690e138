//! GraphQL subscription resolvers.
//!
//! `counter` is a self-contained finite stream; `events` bridges from the
//! schema's [`EventBus`].

use std::time::Duration;

use {
    async_graphql::{Context, Error, Result, Subscription},
    tokio::sync::broadcast::error::RecvError,
    tokio_stream::Stream,
};

use crate::{context::EventBus, types::Event};

/// Root subscription type.
#[derive(Default)]
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Count from `from` to `to` inclusive, `intervalMs` apart.
    ///
    /// With `failAt`, the stream fails when it reaches that value.
    async fn counter(
        &self,
        #[graphql(default = 1)] from: i32,
        #[graphql(default = 2)] to: i32,
        #[graphql(default = 0)] interval_ms: u64,
        fail_at: Option<i32>,
    ) -> Result<impl Stream<Item = Result<i32>>> {
        if to < from {
            return Err(Error::new(format!("'to' ({to}) is below 'from' ({from})")));
        }
        Ok(async_stream::stream! {
            for n in from..=to {
                if interval_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                if fail_at == Some(n) {
                    yield Err(Error::new(format!("counter failed at {n}")));
                    break;
                }
                yield Ok(n);
            }
        })
    }

    /// Events published through the `publish` mutation, optionally filtered
    /// by topic.
    async fn events(
        &self,
        ctx: &Context<'_>,
        topic: Option<String>,
    ) -> Result<impl Stream<Item = Event>> {
        let mut rx = ctx.data::<EventBus>()?.subscribe();
        Ok(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if topic.as_ref().is_none_or(|t| *t == event.topic) {
                            yield event;
                        }
                    },
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
