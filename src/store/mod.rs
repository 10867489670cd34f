//! Key-value backends consumed by the cache core.
//!
//! The core only needs four operations from a backend: read, write with
//! expiry, remaining-TTL introspection and pattern-based bulk deletion.
//! Backends report their failures honestly; it is the cache core that
//! decides to degrade instead of propagating them.
//!
//! # Submodules
//!
//! - `redis`: shared Redis instance over a reconnecting async connection.
//! - `memory`: bounded in-process LRU store with per-entry expiry.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::error::Result;
use async_trait::async_trait;

/// TTL sentinel for a key that does not exist (or has already expired).
pub const TTL_MISSING: i64 = -2;

/// TTL sentinel for a key that exists but carries no expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Contract between the cache core and a key-value backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Read the serialized value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl_seconds`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Remaining lifetime of `key` in seconds, or a negative sentinel
    /// ([`TTL_MISSING`], [`TTL_PERSISTENT`]).
    async fn ttl(&self, key: &str) -> Result<i64>;

    /// Delete every key matching the glob `pattern` and return how many went.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;
}

/// Redis-style glob matching supporting `*` and `?`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    // Position of the last `*` seen and the key index it was matched against
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
