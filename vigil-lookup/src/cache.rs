//! Single-flight, TTL-bounded cache for expensive upstream lookups.
//!
//! Concurrent callers asking for the same key collapse into one upstream
//! load. Each answer reports whether the caller triggered that load
//! (`from_cache == false`) or was served by the cache or by somebody
//! else's in-flight load (`from_cache == true`).
//!
//! # Slot lifecycle
//!
//! ```text
//!            first miss                 load Ok
//! (absent) ─────────────► Pending ─────────────────► Ready ──┐
//!    ▲                       │                               │
//!    │       load Err        │        expiry / invalidate    │
//!    └───────────────────────┴───────────────────────────────┘
//! ```
//!
//! Slots are spread over independently locked shards. A shard lock is only
//! held for the synchronous transitions above, never across an `.await`.
//! Loads run on a spawned tokio task, so a caller that stops waiting does
//! not cancel the load for everybody else.

use crate::error::CacheError;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Upper bound for an entry lifetime when `now + ttl` would overflow.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Outcome published to every caller waiting on one load.
type LoadOutcome<V, E> = Option<Result<V, CacheError<E>>>;

/// Value returned by [`SingleFlightCache::get_or_load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V> {
    /// The cached or freshly loaded value.
    pub value: V,
    /// `false` only for the caller whose call ran the loader.
    pub from_cache: bool,
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls answered from a ready, unexpired entry.
    pub hits: u64,
    /// Calls that started a new upstream load.
    pub misses: u64,
    /// Calls that waited on a load started by another caller.
    pub coalesced: u64,
    /// Loads that ended in an error or were aborted.
    pub failures: u64,
}

enum Slot<V, E> {
    Ready {
        value: V,
        expires_at: Instant,
    },
    Pending {
        generation: u64,
        done: watch::Receiver<LoadOutcome<V, E>>,
    },
}

type Shard<K, V, E> = Mutex<HashMap<K, Slot<V, E>>>;

struct Inner<K, V, E> {
    shards: Box<[Shard<K, V, E>]>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

impl<K: Hash, V, E> Inner<K, V, E> {
    fn shard(&self, key: &K) -> MutexGuard<'_, HashMap<K, Slot<V, E>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Role a caller takes for one `get_or_load` call.
enum Claim<V, E> {
    Hit(V),
    Follower(watch::Receiver<LoadOutcome<V, E>>),
    Leader {
        generation: u64,
        done_tx: watch::Sender<LoadOutcome<V, E>>,
        done_rx: watch::Receiver<LoadOutcome<V, E>>,
    },
}

/// Key → value cache with TTL, request coalescing and freshness reporting.
///
/// Cloning is cheap; clones share the same entries.
pub struct SingleFlightCache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for SingleFlightCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> fmt::Debug for SingleFlightCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("shards", &self.inner.shards.len())
            .finish_non_exhaustive()
    }
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create an empty cache spread over `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(Inner {
                shards,
                next_generation: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached value for `key`, or load it exactly once.
    ///
    /// - A ready, unexpired entry is returned with `from_cache = true`.
    /// - If another caller is already loading `key`, this call waits for
    ///   that load and returns its value with `from_cache = true`.
    /// - Otherwise `loader` is invoked, the value is cached for `ttl`, and
    ///   this caller receives it with `from_cache = false`.
    ///
    /// Must be called from within a tokio runtime: the load is spawned so
    /// that it completes even if this caller stops waiting.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::LookupFailed`] to every waiter when the loader
    /// fails. Failures are never cached; the next call retries the loader.
    /// Returns [`CacheError::LoadAborted`] if the load task panicked.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        loader: F,
    ) -> Result<Lookup<V>, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.claim(&key) {
            Claim::Hit(value) => Ok(Lookup {
                value,
                from_cache: true,
            }),
            Claim::Follower(done) => wait_for_load(done).await.map(|value| Lookup {
                value,
                from_cache: true,
            }),
            Claim::Leader {
                generation,
                done_tx,
                done_rx,
            } => {
                self.spawn_load(key, generation, ttl, done_tx, loader);
                wait_for_load(done_rx).await.map(|value| Lookup {
                    value,
                    from_cache: false,
                })
            }
        }
    }

    /// Decide this caller's role atomically with respect to the key's shard.
    fn claim(&self, key: &K) -> Claim<V, E> {
        let mut shard = self.inner.shard(key);
        match shard.get(key) {
            Some(Slot::Ready { value, expires_at }) if Instant::now() < *expires_at => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Claim::Hit(value.clone());
            }
            Some(Slot::Pending { done, .. }) => {
                self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                return Claim::Follower(done.clone());
            }
            _ => {}
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = watch::channel(None);
        shard.insert(
            key.clone(),
            Slot::Pending {
                generation,
                done: done_rx.clone(),
            },
        );
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        Claim::Leader {
            generation,
            done_tx,
            done_rx,
        }
    }

    fn spawn_load<F, Fut>(
        &self,
        key: K,
        generation: u64,
        ttl: Duration,
        done_tx: watch::Sender<LoadOutcome<V, E>>,
        loader: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            key: Some(key),
            generation,
        };
        // The guard must exist first: a loader that panics while building its
        // future still releases the pending slot on unwind.
        let load = loader();
        tokio::spawn(async move {
            let outcome = load
                .await
                .map_err(|e| CacheError::LookupFailed(Arc::new(e)));
            guard.settle(&outcome, ttl);
            // Waiters may all have gone away; the slot is already settled.
            let _ = done_tx.send(Some(outcome));
        });
    }

    /// Peek at a ready, unexpired value without loading or touching stats.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.inner.shard(key).get(key) {
            Some(Slot::Ready { value, expires_at }) if Instant::now() < *expires_at => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Drop the entry for `key`, ready or pending. Returns `true` if one existed.
    ///
    /// An in-flight load for an invalidated key still answers its current
    /// waiters but does not repopulate the cache.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.shard(key).remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for shard in self.inner.shards.iter() {
            shard.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    /// Remove ready entries whose TTL has elapsed. Returns how many were removed.
    ///
    /// Expired entries are already ignored on read; this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.inner.shards.iter() {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            let before = shard.len();
            shard.retain(|_, slot| match slot {
                Slot::Ready { expires_at, .. } => now < *expires_at,
                Slot::Pending { .. } => true,
            });
            removed += before - shard.len();
        }
        removed
    }

    /// Number of ready, unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .values()
                    .filter(|slot| matches!(slot, Slot::Ready { expires_at, .. } if now < *expires_at))
                    .count()
            })
            .sum()
    }

    /// Returns `true` when no ready, unexpired entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .values()
                    .filter(|slot| matches!(slot, Slot::Pending { .. }))
                    .count()
            })
            .sum()
    }

    /// Snapshot of the hit/miss/coalesced/failure counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}

/// Owns the pending slot of one load until the load settles.
///
/// If the load task is dropped before settling (panic, runtime shutdown)
/// the pending slot is removed so the key can be loaded again.
struct PendingGuard<K: Hash + Eq, V, E> {
    inner: Arc<Inner<K, V, E>>,
    key: Option<K>,
    generation: u64,
}

impl<K: Hash + Eq, V: Clone, E> PendingGuard<K, V, E> {
    fn settle(&mut self, outcome: &Result<V, CacheError<E>>, ttl: Duration) {
        let Some(key) = self.key.take() else {
            return;
        };
        if outcome.is_err() {
            self.inner.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut shard = self.inner.shard(&key);
        if !owns_slot(&shard, &key, self.generation) {
            // Invalidated (and possibly reloaded) while this load was running.
            return;
        }
        match outcome {
            Ok(value) => {
                let now = Instant::now();
                let expires_at = now
                    .checked_add(ttl)
                    .unwrap_or_else(|| now + MAX_TTL);
                shard.insert(
                    key,
                    Slot::Ready {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
            Err(_) => {
                shard.remove(&key);
            }
        }
    }
}

impl<K: Hash + Eq, V, E> Drop for PendingGuard<K, V, E> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        self.inner.failures.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.inner.shard(&key);
        if owns_slot(&shard, &key, self.generation) {
            shard.remove(&key);
        }
    }
}

fn owns_slot<K: Hash + Eq, V, E>(
    shard: &HashMap<K, Slot<V, E>>,
    key: &K,
    generation: u64,
) -> bool {
    matches!(
        shard.get(key),
        Some(Slot::Pending { generation: current, .. }) if *current == generation
    )
}

async fn wait_for_load<V: Clone, E>(
    mut done: watch::Receiver<LoadOutcome<V, E>>,
) -> Result<V, CacheError<E>> {
    let outcome = match done.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone(),
        Err(_) => None,
    };
    outcome.unwrap_or(Err(CacheError::LoadAborted))
}
