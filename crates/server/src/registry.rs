//! Live subscriptions, keyed by connection and correlation id.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {tokio_util::sync::CancellationToken, tracing::debug};

use crate::error::{Error, Result};

/// How long a cancel that beat its `start`, or a closed connection, is
/// remembered.
const TOMBSTONE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    connection_id: String,
    id: String,
}

impl Key {
    fn new(connection_id: &str, id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            id: id.to_string(),
        }
    }
}

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Tables {
    live: HashMap<Key, Entry>,
    /// Cancels that arrived before their `start` was registered.
    cancelled: HashMap<Key, Instant>,
    /// Connections already torn down.
    closed: HashMap<String, Instant>,
}

impl Tables {
    fn prune(&mut self, ttl: Duration) {
        self.cancelled.retain(|_, at| at.elapsed() < ttl);
        self.closed.retain(|_, at| at.elapsed() < ttl);
    }
}

/// Maps (connection id, correlation id) to the cancellation handle of the
/// bridge serving it.
///
/// Entries are removed when the bridge finishes (through the
/// [`Registration`] guard), when the client cancels, or when the connection
/// goes away.
///
/// Frames of one connection are handled concurrently, so a `cancel` or a
/// disconnect can be processed before the `start` it follows reaches
/// [`register`](Self::register). Both leave a tombstone that makes the late
/// registration fail instead of leaking a subscription nobody listens to.
pub struct SubscriptionRegistry {
    tables: Mutex<Tables>,
    next_generation: AtomicU64,
    /// `0` means unlimited.
    max_per_connection: usize,
    tombstone_ttl: Duration,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SubscriptionRegistry {
    pub fn new(max_per_connection: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_generation: AtomicU64::new(0),
            max_per_connection,
            tombstone_ttl: TOMBSTONE_TTL,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `id` on `connection_id`.
    ///
    /// Fails if the id is already live on that connection, the connection
    /// is at its limit, the id was cancelled before it got here, or the
    /// connection is already gone.
    pub fn register(self: &Arc<Self>, connection_id: &str, id: &str) -> Result<Registration> {
        let key = Key::new(connection_id, id);
        let mut tables = self.tables();

        if tables.closed.contains_key(connection_id) {
            return Err(Error::ConnectionClosed(key.connection_id));
        }
        if tables.live.contains_key(&key) {
            return Err(Error::DuplicateSubscription {
                connection_id: key.connection_id,
                id: key.id,
            });
        }
        if tables.cancelled.remove(&key).is_some() {
            debug!(conn_id = %key.connection_id, subscription_id = %key.id, "start arrived after its cancel");
            return Err(Error::Cancelled {
                connection_id: key.connection_id,
                id: key.id,
            });
        }
        if self.max_per_connection > 0 {
            let open = tables
                .live
                .keys()
                .filter(|k| k.connection_id == connection_id)
                .count();
            if open >= self.max_per_connection {
                return Err(Error::SubscriptionLimit {
                    connection_id: key.connection_id,
                    limit: self.max_per_connection,
                });
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        tables.live.insert(key.clone(), Entry {
            generation,
            token: token.clone(),
        });
        debug!(conn_id = %key.connection_id, subscription_id = %key.id, "subscription registered");

        Ok(Registration {
            registry: Arc::clone(self),
            key,
            generation,
            token,
        })
    }

    /// Cancel one subscription. Returns `false` if it was not live.
    ///
    /// An unknown id is remembered for a while so a `start` still in flight
    /// for it is refused.
    pub fn cancel(&self, connection_id: &str, id: &str) -> bool {
        let key = Key::new(connection_id, id);
        let mut tables = self.tables();
        match tables.live.remove(&key) {
            Some(entry) => {
                entry.token.cancel();
                true
            },
            None => {
                tables.prune(self.tombstone_ttl);
                if !tables.closed.contains_key(connection_id) {
                    tables.cancelled.insert(key, Instant::now());
                }
                false
            },
        }
    }

    /// Cancel every subscription of a connection and refuse later
    /// registrations on it. Returns how many were live.
    pub fn cancel_connection(&self, connection_id: &str) -> usize {
        let mut tables = self.tables();
        let mut cancelled = 0;
        tables.live.retain(|key, entry| {
            if key.connection_id == connection_id {
                entry.token.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        tables
            .cancelled
            .retain(|key, _| key.connection_id != connection_id);
        tables.prune(self.tombstone_ttl);
        tables
            .closed
            .insert(connection_id.to_string(), Instant::now());
        cancelled
    }

    pub fn is_live(&self, connection_id: &str, id: &str) -> bool {
        self.tables()
            .live
            .contains_key(&Key::new(connection_id, id))
    }

    pub fn len(&self) -> usize {
        self.tables().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &Key, generation: u64) {
        let mut tables = self.tables();
        // A cancelled id may already have been claimed again.
        if tables
            .live
            .get(key)
            .is_some_and(|e| e.generation == generation)
        {
            tables.live.remove(key);
        }
    }
}

/// Ownership of one registry entry. Dropping it releases the entry.
pub struct Registration {
    registry: Arc<SubscriptionRegistry>,
    key: Key,
    generation: u64,
    token: CancellationToken,
}

impl Registration {
    /// Token cancelled by [`SubscriptionRegistry::cancel`] and
    /// [`SubscriptionRegistry::cancel_connection`].
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.generation);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn duplicate_id_on_same_connection_is_rejected() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        let _a = registry.register("c1", "x").unwrap();
        assert!(matches!(
            registry.register("c1", "x"),
            Err(Error::DuplicateSubscription { .. })
        ));
        // Same id on another connection is independent.
        let _b = registry.register("c2", "x").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn dropping_registration_releases_entry() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        let reg = registry.register("c1", "x").unwrap();
        assert!(registry.is_live("c1", "x"));
        drop(reg);
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_fires_token_and_removes_entry() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        let reg = registry.register("c1", "x").unwrap();
        let token = reg.token();

        assert!(registry.cancel("c1", "x"));
        assert!(token.is_cancelled());
        assert!(!registry.is_live("c1", "x"));
        assert!(!registry.cancel("c1", "x"));
    }

    #[test]
    fn stale_registration_does_not_evict_reused_id() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        let old = registry.register("c1", "x").unwrap();
        registry.cancel("c1", "x");
        let _new = registry.register("c1", "x").unwrap();

        drop(old);
        assert!(registry.is_live("c1", "x"));
    }

    #[test]
    fn cancel_connection_only_touches_that_connection() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        let a = registry.register("c1", "a").unwrap();
        let b = registry.register("c1", "b").unwrap();
        let other = registry.register("c2", "a").unwrap();

        assert_eq!(registry.cancel_connection("c1"), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert!(!other.token().is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn per_connection_limit_is_enforced() {
        let registry = Arc::new(SubscriptionRegistry::new(1));
        let _a = registry.register("c1", "a").unwrap();
        assert!(matches!(
            registry.register("c1", "b"),
            Err(Error::SubscriptionLimit { limit: 1, .. })
        ));
        let _c = registry.register("c2", "a").unwrap();
    }

    #[test]
    fn cancel_that_beats_its_start_refuses_the_start() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        assert!(!registry.cancel("c1", "x"));

        assert!(matches!(
            registry.register("c1", "x"),
            Err(Error::Cancelled { .. })
        ));
        assert!(registry.is_empty());
        // The tombstone is consumed; the id can be used again.
        let _again = registry.register("c1", "x").unwrap();
    }

    #[test]
    fn closed_connection_refuses_late_registrations() {
        let registry = Arc::new(SubscriptionRegistry::new(0));
        assert_eq!(registry.cancel_connection("c1"), 0);

        assert!(matches!(
            registry.register("c1", "x"),
            Err(Error::ConnectionClosed(_))
        ));
        let _other = registry.register("c2", "x").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn tombstones_expire() {
        let registry = Arc::new(SubscriptionRegistry {
            tombstone_ttl: Duration::ZERO,
            ..SubscriptionRegistry::new(0)
        });
        registry.cancel_connection("c1");
        registry.cancel("c2", "x");
        // Pruning runs on the next tombstone write.
        registry.cancel("c3", "y");

        let tables = registry.tables();
        assert!(tables.closed.is_empty());
        assert_eq!(tables.cancelled.len(), 1);
    }
}
