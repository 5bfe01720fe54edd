//! IdentityCache — network identity → service identity with bounded
//! staleness and per-identity request deduplication.
//!
//! Lookups hit a fixed-capacity LRU first. On a miss, the first caller for
//! an identity starts the resolution and parks a shared future in the
//! in-flight table; every concurrent caller for the same identity awaits
//! that same future and observes the same result or error. Successful
//! results are inserted into the LRU before the in-flight entry is removed.
//!
//! Staleness is bounded by a full flush: on every tick of the flush
//! interval the LRU is swapped for an empty one under the store lock, so
//! readers never see a half-cleared cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use keeper_core::config::IdentityCacheConfig;
use keeper_core::{IdentityResolver, KeeperResult, ServiceIdentity};

type Resolution = Shared<BoxFuture<'static, KeeperResult<ServiceIdentity>>>;
type InFlight = Mutex<HashMap<String, Resolution>>;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// External resolutions actually started.
    pub resolutions: u64,
    pub flushes: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
    flushes: AtomicU64,
}

/// Deduplicated, size-bounded, periodically flushed identity cache.
///
/// Cheap to clone; clones share the store, the in-flight table and the
/// resolver.
#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<Mutex<LruCache<String, ServiceIdentity>>>,
    in_flight: Arc<InFlight>,
    resolver: Arc<dyn IdentityResolver>,
    capacity: NonZeroUsize,
    flush_interval: Duration,
    counters: Arc<Counters>,
}

impl IdentityCache {
    /// Capacity of the cache when not configured otherwise.
    pub const DEFAULT_CAPACITY: usize = 1000;
    /// Flush cadence when not configured otherwise.
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(180);

    pub fn new(resolver: Arc<dyn IdentityResolver>, capacity: usize, flush_interval: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(Mutex::new(LruCache::new(capacity))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            resolver,
            capacity,
            flush_interval,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn from_config(resolver: Arc<dyn IdentityResolver>, config: &IdentityCacheConfig) -> Self {
        Self::new(resolver, config.capacity, config.flush_interval)
    }

    /// Resolve `identity`, consulting the cache first.
    pub async fn resolve(&self, identity: &str) -> KeeperResult<ServiceIdentity> {
        if let Some(hit) = self.lookup(identity).await {
            return Ok(hit);
        }

        let resolution = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(identity) {
                Some(pending) => pending.clone(),
                None => {
                    // Another caller may have finished between the first
                    // lookup and taking the in-flight lock.
                    if let Some(hit) = self.lookup(identity).await {
                        return Ok(hit);
                    }
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    let resolution = self.start_resolution(identity);
                    in_flight.insert(identity.to_string(), resolution.clone());
                    resolution
                }
            }
        };

        resolution.await
    }

    async fn lookup(&self, identity: &str) -> Option<ServiceIdentity> {
        let hit = self.store.lock().await.get(identity).cloned();
        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn start_resolution(&self, identity: &str) -> Resolution {
        self.counters.resolutions.fetch_add(1, Ordering::Relaxed);
        let key = identity.to_string();
        let resolver = Arc::clone(&self.resolver);
        let store = Arc::clone(&self.store);
        // Weak so a parked future never keeps its own table alive.
        let in_flight: Weak<InFlight> = Arc::downgrade(&self.in_flight);

        async move {
            let result = resolver.resolve_identity(&key).await;
            match &result {
                Ok(resolved) => {
                    store.lock().await.put(key.clone(), resolved.clone());
                    debug!(identity = %key, service = %resolved.service_name, "identity resolved");
                }
                Err(e) => debug!(identity = %key, error = %e, "identity resolution failed"),
            }
            if let Some(in_flight) = in_flight.upgrade() {
                in_flight.lock().await.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Discard every cached entry by replacing the store.
    pub async fn flush(&self) {
        let mut store = self.store.lock().await;
        let dropped = store.len();
        *store = LruCache::new(self.capacity);
        drop(store);
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        let stats = self.stats();
        debug!(
            dropped,
            hits = stats.hits,
            misses = stats.misses,
            resolutions = stats.resolutions,
            flushes = stats.flushes,
            "identity cache flushed"
        );
    }

    /// Flush on a fixed cadence until `shutdown` fires.
    pub async fn run_flusher(&self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.flush_interval;
        let mut ticker = tokio::time::interval_at(start, self.flush_interval);
        info!(interval = ?self.flush_interval, capacity = self.capacity.get(), "identity cache flusher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                _ = shutdown.changed() => {
                    let stats = self.stats();
                    info!(
                        hits = stats.hits,
                        misses = stats.misses,
                        flushes = stats.flushes,
                        "identity cache flusher shutting down"
                    );
                    break;
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            resolutions: self.counters.resolutions.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}
