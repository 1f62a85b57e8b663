//! Request deduplication keyed by client-supplied idempotency keys.
//!
//! Reservation rides on the store's single-writer `insert_if_absent`,
//! so exactly one concurrent caller observes `New` for a fresh key.
//! Everyone else sees `InProgress` until the winner stores its response,
//! after which the cached response is returned for the TTL window.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::domain::foundation::{Namespace, SimError, StoredObject};
use crate::ports::Clock;

use super::{ListOptions, TypedStore};

/// Entries live 24 hours from reservation or the last `store`.
const TTL_SECS: i64 = 24 * 60 * 60;

/// How often the background sweep reclaims expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Bound on reservation retries under contention. Each lost race means
/// another writer just inserted, so the next iteration resolves; the
/// bound only guards against a pathological delete/insert storm.
const MAX_CHECK_ATTEMPTS: usize = 16;

/// Cached response replayed for retried requests.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: JsonValue,
}

/// What a `check` call observed.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Key seen before; replay this response instead of re-executing.
    Cached(CachedResponse),
    /// This caller won the reservation and now owns execution; it must
    /// eventually call `store`.
    New,
    /// Another caller is executing; do not proceed. Retry policy is the
    /// caller's concern.
    InProgress,
}

#[derive(Debug, Clone)]
enum EntryState {
    InProgress,
    Completed(CachedResponse),
}

/// One `(namespace, key)` entry.
#[derive(Debug, Clone)]
pub struct IdempotencyEntry {
    key: String,
    namespace: Namespace,
    created: i64,
    state: EntryState,
    expires_at: i64,
}

impl StoredObject for IdempotencyEntry {
    fn id(&self) -> &str {
        &self.key
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn created(&self) -> i64 {
        self.created
    }
}

/// Deduplicates retried requests within a 24 hour window.
pub struct IdempotencyCache {
    entries: Arc<TypedStore<IdempotencyEntry>>,
    clock: Arc<dyn Clock>,
}

impl IdempotencyCache {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            entries: TypedStore::new("idempotency_entry"),
            clock,
        })
    }

    /// Look up a key, reserving it if absent.
    ///
    /// Expired entries are reclaimed in place before the reservation
    /// attempt. Losing the insert race retries the lookup; the loop is
    /// bounded and falls back to `InProgress` if it ever exhausts.
    pub async fn check(&self, namespace: &Namespace, key: &str) -> Result<CheckOutcome, SimError> {
        let now = self.clock.now();
        for _ in 0..MAX_CHECK_ATTEMPTS {
            match self.entries.get(namespace, key) {
                Ok(entry) if entry.expires_at <= now => {
                    // Lazy reclamation; a concurrent delete is fine.
                    let _ = self.entries.delete(namespace, key).await;
                }
                Ok(entry) => {
                    return Ok(match entry.state {
                        EntryState::InProgress => CheckOutcome::InProgress,
                        EntryState::Completed(response) => CheckOutcome::Cached(response),
                    });
                }
                Err(SimError::NotFound { .. }) => {
                    let reservation = IdempotencyEntry {
                        key: key.to_string(),
                        namespace: namespace.clone(),
                        created: now,
                        state: EntryState::InProgress,
                        expires_at: now + TTL_SECS,
                    };
                    if self.entries.insert_if_absent(reservation).await? {
                        return Ok(CheckOutcome::New);
                    }
                    // Lost the race; re-read what the winner wrote.
                }
                Err(err) => return Err(err),
            }
        }
        tracing::warn!(key, %namespace, "Idempotency check exhausted retries under contention");
        Ok(CheckOutcome::InProgress)
    }

    /// Cache the response for a reserved key and restart its TTL.
    pub async fn store(
        &self,
        namespace: &Namespace,
        key: &str,
        status: u16,
        body: JsonValue,
    ) -> Result<(), SimError> {
        let now = self.clock.now();
        let created = self
            .entries
            .get(namespace, key)
            .map(|entry| entry.created)
            .unwrap_or(now);
        self.entries
            .insert(IdempotencyEntry {
                key: key.to_string(),
                namespace: namespace.clone(),
                created,
                state: EntryState::Completed(CachedResponse { status, body }),
                expires_at: now + TTL_SECS,
            })
            .await?;
        Ok(())
    }

    /// Drop every entry across all namespaces.
    pub async fn clear(&self) -> Result<usize, SimError> {
        self.entries.retain(|_| false).await
    }

    /// Drop one namespace's entries.
    pub async fn clear_namespace(&self, namespace: &Namespace) -> Result<usize, SimError> {
        self.entries.clear_namespace(namespace).await
    }

    /// Delete expired entries across all namespaces.
    pub async fn sweep(&self) -> Result<usize, SimError> {
        let now = self.clock.now();
        let removed = self.entries.retain(move |entry| entry.expires_at > now).await?;
        if removed > 0 {
            tracing::debug!(removed, "Idempotency sweep reclaimed expired entries");
        }
        Ok(removed)
    }

    /// Number of live entries in a namespace (test support).
    pub fn len(&self, namespace: &Namespace) -> usize {
        self.entries.list(namespace, &ListOptions::default()).data.len()
    }

    /// Spawn the hourly sweep task; stops when `shutdown` flips true.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(err) = cache.sweep().await {
                            tracing::warn!(error = %err, "Idempotency sweep failed");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::SimClock;
    use serde_json::json;

    fn cache_at(start: i64) -> (Arc<IdempotencyCache>, Arc<SimClock>) {
        let clock = Arc::new(SimClock::manual(start));
        let cache = IdempotencyCache::new(clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn fresh_key_is_new_then_in_progress() {
        let (cache, _) = cache_at(1_000);
        let ns = Namespace::new("run-a");

        assert_eq!(cache.check(&ns, "key-1").await.unwrap(), CheckOutcome::New);
        assert_eq!(
            cache.check(&ns, "key-1").await.unwrap(),
            CheckOutcome::InProgress
        );
    }

    #[tokio::test]
    async fn stored_response_is_replayed() {
        let (cache, _) = cache_at(1_000);
        let ns = Namespace::new("run-a");

        assert_eq!(cache.check(&ns, "key-1").await.unwrap(), CheckOutcome::New);
        cache
            .store(&ns, "key-1", 200, json!({"id": "cus_1"}))
            .await
            .unwrap();

        match cache.check(&ns, "key-1").await.unwrap() {
            CheckOutcome::Cached(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.body["id"], "cus_1");
            }
            other => panic!("expected cached response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_checks_have_exactly_one_winner() {
        let (cache, _) = cache_at(1_000);
        let ns = Namespace::new("run-a");

        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            let ns = ns.clone();
            handles.push(tokio::spawn(
                async move { cache.check(&ns, "contested").await },
            ));
        }

        let mut new_count = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                CheckOutcome::New => new_count += 1,
                CheckOutcome::InProgress => {}
                CheckOutcome::Cached(_) => panic!("nothing was stored yet"),
            }
        }
        assert_eq!(new_count, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_reclaimed_on_lookup() {
        let (cache, clock) = cache_at(1_000);
        let ns = Namespace::new("run-a");

        assert_eq!(cache.check(&ns, "key-1").await.unwrap(), CheckOutcome::New);
        cache.store(&ns, "key-1", 200, json!({})).await.unwrap();

        clock.advance(TTL_SECS + 1);

        // Past the TTL the key behaves as fresh again.
        assert_eq!(cache.check(&ns, "key-1").await.unwrap(), CheckOutcome::New);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let (cache, clock) = cache_at(1_000);
        let ns = Namespace::new("run-a");

        assert_eq!(cache.check(&ns, "old").await.unwrap(), CheckOutcome::New);
        clock.advance(TTL_SECS - 10);
        assert_eq!(cache.check(&ns, "young").await.unwrap(), CheckOutcome::New);
        clock.advance(11);

        let removed = cache.sweep().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(&ns), 1);
    }

    #[tokio::test]
    async fn clear_namespace_is_scoped() {
        let (cache, _) = cache_at(1_000);
        let ns_a = Namespace::new("run-a");
        let ns_b = Namespace::new("run-b");

        cache.check(&ns_a, "k").await.unwrap();
        cache.check(&ns_b, "k").await.unwrap();

        cache.clear_namespace(&ns_a).await.unwrap();
        assert_eq!(cache.len(&ns_a), 0);
        assert_eq!(cache.len(&ns_b), 1);
    }
}
