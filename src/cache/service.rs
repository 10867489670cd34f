//! Read-through cache core.
//!
//! [`CacheService::cache_or_fetch`] is the single entry point for cacheable,
//! expensive-to-compute data. It layers four behaviours over a
//! [`KeyValueStore`]:
//!
//! 1. Read-through: a miss runs the producer and writes the result back.
//! 2. Single-flight: concurrent misses on one key share one producer run.
//!    The check for a pending fetch and the registration of a new one happen
//!    under the same lock, with no await in between.
//! 3. Stale-while-revalidate: a hit whose remaining TTL has dropped under the
//!    threshold is returned immediately while one background task per key
//!    recomputes it and rewrites it with the full TTL.
//! 4. Degradation: store failures (and a missing store) never reach the
//!    caller; the value is simply computed fresh.

// Author: kelexine (https://github.com/kelexine)

use super::models::{CacheStats, StatsCounters};
use super::options::{CacheOptions, CachePolicy, ResolvedOptions};
use super::tracker::{AccessMeta, AccessStat, AccessTracker, DEFAULT_TOP_TENANTS};
use crate::config::{AppConfig, CacheBackend};
use crate::error::{CacheError, Result};
use crate::metrics;
use crate::store::{KeyValueStore, MemoryStore, RedisStore};
use crate::utils::logging::redact_url;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

struct Inner {
    store: Option<Arc<dyn KeyValueStore>>,
    defaults: CacheOptions,
    tracker: AccessTracker,
    /// Pending miss fetches, one per key
    in_flight: Mutex<HashMap<String, SharedFetch>>,
    /// Keys with a background refresh running
    refreshing: Mutex<HashSet<String>>,
    stats: StatsCounters,
}

impl Inner {
    /// Best-effort write. Failures are logged and counted, never returned.
    async fn write_through(&self, store: &dyn KeyValueStore, key: &str, serialized: &str, ttl: u64) {
        if let Err(e) = store.set_with_expiry(key, serialized, ttl).await {
            warn!("[CACHE] WRITE_ERROR key={} error={}", key, e);
            StatsCounters::bump(&self.stats.write_errors);
            metrics::record_cache_outcome("write_error");
        }
    }
}

/// Removes a key from the in-flight map once its fetch settles, even on panic.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
        metrics::inflight_finished("fetch");
    }
}

/// Clears the refresh marker for a key once its background refresh settles.
struct RefreshGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.inner.refreshing.lock().remove(&self.key);
        metrics::inflight_finished("refresh");
    }
}

/// Process-wide cache service.
///
/// Construct once at startup and share by cloning; clones point at the same
/// store, tracker and in-flight bookkeeping.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    /// Build a service over `store`; `None` runs in no-cache mode.
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, defaults: CacheOptions) -> Self {
        match &store {
            Some(store) => info!("Cache core using {} store", store.name()),
            None => warn!("No cache store configured; every call computes fresh"),
        }

        Self {
            inner: Arc::new(Inner {
                store,
                defaults,
                tracker: AccessTracker::new(),
                in_flight: Mutex::new(HashMap::new()),
                refreshing: Mutex::new(HashSet::new()),
                stats: StatsCounters::default(),
            }),
        }
    }

    /// Service over a concrete store with default options.
    pub fn with_store<S: KeyValueStore + 'static>(store: S) -> Self {
        Self::new(Some(Arc::new(store)), CacheOptions::default())
    }

    /// Service without a store.
    pub fn disabled() -> Self {
        Self::new(None, CacheOptions::default())
    }

    /// Build the service described by `config`.
    ///
    /// A Redis backend without a URL, or one that cannot be reached at
    /// startup, leaves the service in no-cache mode rather than failing.
    pub async fn connect(config: &AppConfig) -> Self {
        let defaults = CacheOptions::new()
            .ttl(i64::try_from(config.cache.default_ttl_seconds).unwrap_or(i64::MAX))
            .swr_threshold(config.cache.swr_threshold_ratio);

        let store: Option<Arc<dyn KeyValueStore>> = match config.cache.backend {
            CacheBackend::Memory => Some(Arc::new(MemoryStore::new(config.cache.memory_capacity))),
            CacheBackend::Redis => match config.redis.url.as_deref() {
                None => None,
                Some(url) => match RedisStore::connect(url, &config.redis).await {
                    Ok(store) => Some(Arc::new(store)),
                    Err(e) => {
                        warn!(
                            "Redis at {} unavailable, continuing without cache: {}",
                            redact_url(url),
                            e
                        );
                        None
                    }
                },
            },
        };

        Self::new(store, defaults)
    }

    /// Options seeded with the configured defaults.
    pub fn options(&self) -> CacheOptions {
        self.inner.defaults.clone()
    }

    pub fn has_store(&self) -> bool {
        self.inner.store.is_some()
    }

    /// Name of the attached backend, if any.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.inner.store.as_ref().map(|s| s.name())
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Number of miss fetches currently pending.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Number of background refreshes currently running.
    pub fn refreshing(&self) -> usize {
        self.inner.refreshing.lock().len()
    }

    pub fn tracker(&self) -> &AccessTracker {
        &self.inner.tracker
    }

    /// Count one access for a tenant.
    pub fn record_access(&self, meta: &AccessMeta) {
        self.inner.tracker.record(Some(meta));
    }

    /// Most accessed tenants; `None` means the default of 20.
    pub fn list_top_tenants(&self, limit: Option<usize>) -> Vec<AccessStat> {
        self.inner
            .tracker
            .top_tenants(limit.unwrap_or(DEFAULT_TOP_TENANTS))
    }

    /// Delete every cached key matching `pattern`. Returns the number removed;
    /// store failures are logged and reported as zero.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> u64 {
        let Some(store) = &self.inner.store else {
            debug!("[CACHE] INVALIDATE pattern={} skipped, no store", pattern);
            return 0;
        };

        match store.delete_by_pattern(pattern).await {
            Ok(deleted) => {
                info!("[CACHE] INVALIDATE pattern={} deleted={}", pattern, deleted);
                metrics::record_cache_outcome("invalidate");
                deleted
            }
            Err(e) => {
                warn!("[CACHE] INVALIDATE_ERROR pattern={} error={}", pattern, e);
                metrics::record_cache_outcome("invalidate_error");
                0
            }
        }
    }

    /// Return the cached value for `key`, or compute it with `producer`.
    ///
    /// `policy` is either a bare TTL in seconds or a [`CacheOptions`].
    /// Values travel through JSON, so what comes back from the cache has
    /// JSON semantics (no special handling for dates or maps with non-string keys).
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidKey` for an empty key.
    /// - `CacheError::Producer` when the producer fails; every caller sharing
    ///   that fetch receives the same error.
    /// - `CacheError::Serialization` when the value cannot round-trip through JSON.
    pub async fn cache_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        policy: impl Into<CachePolicy>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()));
        }
        let opts = policy.into().resolve();

        let Some(store) = self.inner.store.clone() else {
            debug!("[CACHE] MISS_NO_REDIS key={}", key);
            StatsCounters::bump(&self.inner.stats.uncached);
            metrics::record_cache_outcome("miss_no_redis");
            let value = producer().await.map_err(CacheError::producer)?;
            self.inner.tracker.record(opts.meta.as_ref());
            return Ok(value);
        };

        if opts.force_refresh {
            info!("[CACHE] FORCE_REFRESH key={}", key);
            StatsCounters::bump(&self.inner.stats.force_refreshes);
            metrics::record_cache_outcome("force_refresh");
            let value = producer().await.map_err(CacheError::producer)?;
            let serialized = serde_json::to_string(&value)?;
            self.inner
                .write_through(store.as_ref(), key, &serialized, opts.ttl_seconds)
                .await;
            self.inner.tracker.record(opts.meta.as_ref());
            return Ok(value);
        }

        let read = store.get(key).await;
        match read {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("[CACHE] HIT key={}", key);
                    StatsCounters::bump(&self.inner.stats.hits);
                    metrics::record_cache_outcome("hit");
                    self.inner.tracker.record(opts.meta.as_ref());
                    if opts.swr_enabled {
                        self.maybe_refresh(store, key, producer, &opts).await;
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("[CACHE] READ_ERROR key={} error=undecodable entry: {}", key, e);
                    StatsCounters::bump(&self.inner.stats.read_errors);
                    metrics::record_cache_outcome("read_error");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("[CACHE] READ_ERROR key={} error={}", key, e);
                StatsCounters::bump(&self.inner.stats.read_errors);
                metrics::record_cache_outcome("read_error");
            }
        }

        self.fetch_coalesced(store, key, producer, opts).await
    }

    /// Join the pending fetch for `key`, or start one.
    async fn fetch_coalesced<T, F, Fut>(
        &self,
        store: Arc<dyn KeyValueStore>,
        key: &str,
        producer: F,
        opts: ResolvedOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let fetch = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(key) {
                Some(pending) => {
                    debug!("[CACHE] MISS key={} joined pending fetch", key);
                    StatsCounters::bump(&self.inner.stats.coalesced);
                    metrics::record_cache_outcome("coalesced");
                    pending.clone()
                }
                None => {
                    debug!("[CACHE] MISS key={}", key);
                    StatsCounters::bump(&self.inner.stats.misses);
                    metrics::record_cache_outcome("miss");
                    let fetch = self.spawn_fetch(store, key.to_string(), producer, opts);
                    in_flight.insert(key.to_string(), fetch.clone());
                    fetch
                }
            }
        };

        let value = fetch.await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start the producer on its own task so the fetch settles (and the
    /// in-flight entry is cleared) even if every waiter goes away.
    ///
    /// Must be called with the in-flight lock held.
    fn spawn_fetch<T, F, Fut>(
        &self,
        store: Arc<dyn KeyValueStore>,
        key: String,
        producer: F,
        opts: ResolvedOptions,
    ) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        metrics::inflight_started("fetch");

        let task = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
            };

            let value = producer().await.map_err(CacheError::producer)?;
            let json = serde_json::to_value(&value)?;
            let serialized = serde_json::to_string(&json)?;
            inner
                .write_through(store.as_ref(), &key, &serialized, opts.ttl_seconds)
                .await;
            inner.tracker.record(opts.meta.as_ref());
            Ok::<_, CacheError>(json)
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CacheError::Internal(format!("fetch task aborted: {}", e))),
            }
        }
        .boxed()
        .shared()
    }

    /// Kick off a background refresh if the entry is close to expiring.
    async fn maybe_refresh<T, F, Fut>(
        &self,
        store: Arc<dyn KeyValueStore>,
        key: &str,
        producer: F,
        opts: &ResolvedOptions,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let remaining = match store.ttl(key).await {
            Ok(remaining) => remaining,
            Err(e) => {
                debug!("[CACHE] READ_ERROR key={} ttl probe failed: {}", key, e);
                StatsCounters::bump(&self.inner.stats.read_errors);
                return;
            }
        };
        if !opts.should_refresh(remaining) {
            return;
        }
        if !self.inner.refreshing.lock().insert(key.to_string()) {
            debug!("[CACHE] SWR_REFRESH key={} already running", key);
            return;
        }

        info!("[CACHE] SWR_REFRESH key={} remaining={}s", key, remaining);
        StatsCounters::bump(&self.inner.stats.swr_refreshes);
        metrics::record_cache_outcome("swr_refresh");
        metrics::inflight_started("refresh");

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        let ttl = opts.ttl_seconds;
        let meta = opts.meta.clone();

        tokio::spawn(async move {
            let _guard = RefreshGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
            };

            let serialized = match producer().await {
                Ok(value) => serde_json::to_string(&value).map_err(CacheError::from),
                Err(e) => Err(CacheError::producer(e)),
            };

            match serialized {
                Ok(serialized) => {
                    inner.write_through(store.as_ref(), &key, &serialized, ttl).await;
                    inner.tracker.record(meta.as_ref());
                    debug!("[CACHE] SWR_REFRESH key={} done", key);
                }
                Err(e) => {
                    warn!("[CACHE] SWR_REFRESH_ERROR key={} error={}", key, e);
                    metrics::record_cache_outcome("swr_refresh_error");
                }
            }
        });
    }
}
