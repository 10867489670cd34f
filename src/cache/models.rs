//! Cache statistics.

// Author: kelexine (https://github.com/kelexine)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the cache counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the store.
    pub hits: u64,
    /// Reads that started a producer fetch.
    pub misses: u64,
    /// Reads that joined a fetch already in flight.
    pub coalesced: u64,
    /// Calls that bypassed the read with `force_refresh`.
    pub force_refreshes: u64,
    /// Background refreshes started from aging hits.
    pub swr_refreshes: u64,
    /// Calls computed directly because no store is attached.
    pub uncached: u64,
    /// Store reads (or TTL probes) that failed and degraded to a miss.
    pub read_errors: u64,
    /// Store writes that failed after a successful producer run.
    pub write_errors: u64,
}

/// Live counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub force_refreshes: AtomicU64,
    pub swr_refreshes: AtomicU64,
    pub uncached: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            force_refreshes: self.force_refreshes.load(Ordering::Relaxed),
            swr_refreshes: self.swr_refreshes.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}
