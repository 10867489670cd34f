// In-process LRU key-value store with per-entry expiry
// Author: kelexine (https://github.com/kelexine)

use super::{glob_match, KeyValueStore, TTL_MISSING};
use crate::error::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on an entry's lifetime; longer TTLs are saturated to it.
const MAX_EXPIRY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Expiry instant for a TTL of `ttl_seconds`, saturating instead of overflowing.
fn expiry_after(now: Instant, ttl_seconds: u64) -> Instant {
    let ttl = Duration::from_secs(ttl_seconds).min(MAX_EXPIRY);
    now.checked_add(ttl).unwrap_or(now)
}

/// Whole seconds left, rounded to the nearest second like Redis `TTL`.
fn remaining_seconds(left: Duration) -> i64 {
    left.as_secs_f64().round() as i64
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.checked_duration_since(now).filter(|d| !d.is_zero())
    }
}

/// Bounded single-process store.
///
/// Least recently used entries are evicted once `capacity` is reached;
/// expired entries are dropped lazily when touched.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let found = entries
            .get(key)
            .map(|entry| entry.remaining(now).map(|_| entry.value.clone()));
        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: expiry_after(Instant::now(), ttl_seconds),
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.to_string(), entry) {
            if evicted != key {
                debug!("Evicted {} from memory store", evicted);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // peek keeps TTL probes from refreshing recency
        let remaining = entries.peek(key).map(|entry| entry.remaining(now));
        match remaining {
            Some(Some(left)) => Ok(remaining_seconds(left)),
            Some(None) => {
                entries.pop(key);
                Ok(TTL_MISSING)
            }
            None => Ok(TTL_MISSING),
        }
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut entries = self.entries.lock();
        let matched: Vec<String> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matched {
            entries.pop(key);
        }
        Ok(matched.len() as u64)
    }
}
