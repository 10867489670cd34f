//! Per-call cache options.
//!
//! Callers pass either a bare TTL in seconds or a full [`CacheOptions`];
//! both convert into [`CachePolicy`] and are normalized into
//! [`ResolvedOptions`] as soon as they reach the cache core.

// Author: kelexine (https://github.com/kelexine)

use super::tracker::AccessMeta;

/// Default time-to-live for cached entries.
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// Default fraction of the TTL below which a hit triggers a background refresh.
pub const DEFAULT_SWR_THRESHOLD_RATIO: f64 = 0.3;

/// Structured options for a single `cache_or_fetch` call.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Lifetime of the stored value. Clamped to at least one second.
    pub ttl_seconds: i64,
    /// Fraction of `ttl_seconds` under which a hit refreshes in the background.
    pub swr_threshold_ratio: f64,
    /// Skip the cache read and always run the producer.
    pub force_refresh: bool,
    /// Never trigger a background refresh on hit.
    pub disable_swr: bool,
    /// Tenant the value belongs to, forwarded to the access tracker.
    pub meta: Option<AccessMeta>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            swr_threshold_ratio: DEFAULT_SWR_THRESHOLD_RATIO,
            force_refresh: false,
            disable_swr: false,
            meta: None,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    pub fn swr_threshold(mut self, ratio: f64) -> Self {
        self.swr_threshold_ratio = ratio;
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn disable_swr(mut self, disable: bool) -> Self {
        self.disable_swr = disable;
        self
    }

    pub fn meta(mut self, meta: AccessMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// What a caller may hand to `cache_or_fetch`: a bare TTL or full options.
#[derive(Debug, Clone)]
pub enum CachePolicy {
    Ttl(i64),
    Options(CacheOptions),
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Options(CacheOptions::default())
    }
}

impl From<i64> for CachePolicy {
    fn from(ttl: i64) -> Self {
        CachePolicy::Ttl(ttl)
    }
}

impl From<u64> for CachePolicy {
    fn from(ttl: u64) -> Self {
        CachePolicy::Ttl(i64::try_from(ttl).unwrap_or(i64::MAX))
    }
}

impl From<i32> for CachePolicy {
    fn from(ttl: i32) -> Self {
        CachePolicy::Ttl(i64::from(ttl))
    }
}

impl From<CacheOptions> for CachePolicy {
    fn from(options: CacheOptions) -> Self {
        CachePolicy::Options(options)
    }
}

/// Canonical options record used inside the cache core.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub ttl_seconds: u64,
    /// Remaining-TTL at or below which a hit triggers a refresh.
    pub swr_threshold_seconds: i64,
    pub force_refresh: bool,
    pub swr_enabled: bool,
    pub meta: Option<AccessMeta>,
}

impl CachePolicy {
    /// Normalize into the canonical record, clamping TTL and ratio.
    pub fn resolve(self) -> ResolvedOptions {
        let options = match self {
            CachePolicy::Ttl(ttl) => CacheOptions::default().ttl(ttl),
            CachePolicy::Options(options) => options,
        };

        let ttl_seconds = options.ttl_seconds.max(1) as u64;
        let ratio = if options.swr_threshold_ratio.is_nan() {
            DEFAULT_SWR_THRESHOLD_RATIO
        } else {
            options.swr_threshold_ratio.clamp(0.0, 1.0)
        };
        let swr_threshold_seconds = (ttl_seconds as f64 * ratio).floor() as i64;

        ResolvedOptions {
            ttl_seconds,
            swr_threshold_seconds,
            force_refresh: options.force_refresh,
            swr_enabled: !options.disable_swr,
            meta: options.meta,
        }
    }
}

impl ResolvedOptions {
    /// Whether a hit with `remaining` seconds left should refresh in the background.
    pub fn should_refresh(&self, remaining: i64) -> bool {
        self.swr_enabled && remaining > 0 && remaining <= self.swr_threshold_seconds
    }
}
