// Tenant access tracking
// Tracks how often each store's cached data is served, to rank tenants for prewarming.
// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of tenants returned by [`AccessTracker::top_tenants`].
pub const DEFAULT_TOP_TENANTS: usize = 20;

/// Identifies the tenant a cached value belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMeta {
    pub store_slug: Option<String>,
    pub store_id: Option<String>,
}

impl AccessMeta {
    pub fn slug(slug: impl Into<String>) -> Self {
        Self {
            store_slug: Some(slug.into()),
            store_id: None,
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            store_slug: None,
            store_id: Some(id.into()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    fn trimmed(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Popularity record for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessStat {
    pub store_slug: Option<String>,
    pub store_id: Option<String>,
    pub hits: u64,
    pub last_access: DateTime<Utc>,
    /// Tracker-wide sequence number of the latest access, for recency ties.
    #[serde(skip)]
    last_seq: u64,
}

impl AccessStat {
    /// Identifier used to address the tenant: slug when known, id otherwise.
    pub fn identifier(&self) -> Option<&str> {
        self.store_slug.as_deref().or(self.store_id.as_deref())
    }
}

/// In-process hit counter keyed by tenant.
///
/// Entries are never removed; the map is bounded by the number of distinct
/// tenants.
#[derive(Debug, Default)]
pub struct AccessTracker {
    stats: Mutex<HashMap<String, AccessStat>>,
    seq: AtomicU64,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one access for the tenant described by `meta`.
    ///
    /// The slug is the key when present, the id otherwise. A missing slug or
    /// id on the existing record is filled in from later calls.
    pub fn record(&self, meta: Option<&AccessMeta>) {
        let Some(meta) = meta else {
            return;
        };
        let slug = AccessMeta::trimmed(&meta.store_slug);
        let id = AccessMeta::trimmed(&meta.store_id);

        let Some(key) = slug.clone().or_else(|| id.clone()) else {
            return;
        };

        let mut stats = self.stats.lock();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let stat = stats.entry(key).or_insert_with(|| AccessStat {
            store_slug: None,
            store_id: None,
            hits: 0,
            last_access: now,
            last_seq: 0,
        });

        stat.hits += 1;
        stat.last_access = now;
        stat.last_seq = seq;
        if stat.store_slug.is_none() {
            stat.store_slug = slug;
        }
        if stat.store_id.is_none() {
            stat.store_id = id;
        }
    }

    /// Up to `limit` tenants (at least one), most hits first, most recent first on ties.
    pub fn top_tenants(&self, limit: usize) -> Vec<AccessStat> {
        let mut ranked: Vec<AccessStat> = self.stats.lock().values().cloned().collect();
        ranked.sort_by(|a, b| {
            b.hits
                .cmp(&a.hits)
                .then_with(|| b.last_seq.cmp(&a.last_seq))
        });
        ranked.truncate(limit.max(1));
        ranked
    }

    /// Number of distinct tenants seen so far.
    pub fn len(&self) -> usize {
        self.stats.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
