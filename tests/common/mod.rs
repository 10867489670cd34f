// Shared test doubles for the integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use marketcache::error::{CacheError, Result};
use marketcache::store::{glob_match, KeyValueStore, TTL_MISSING};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory store whose TTL answers and failures are set by the test.
///
/// Entries never expire on their own; `ttl` reports the scripted value when
/// one is set, otherwise the TTL of the last write.
#[derive(Default)]
pub struct ScriptedStore {
    entries: Mutex<HashMap<String, (String, u64)>>,
    scripted_ttl: Mutex<Option<i64>>,
    writes: Mutex<Vec<(String, u64)>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_ttl: AtomicBool,
    pub reads: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a raw JSON entry.
    pub fn seed(&self, key: &str, json: &str, ttl: u64) {
        self.entries
            .lock()
            .insert(key.to_string(), (json.to_string(), ttl));
    }

    pub fn script_ttl(&self, remaining: i64) {
        *self.scripted_ttl.lock() = Some(remaining);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).map(|(v, _)| v.clone())
    }

    /// Every successful write as `(key, ttl_seconds)`, oldest first.
    pub fn writes(&self) -> Vec<(String, u64)> {
        self.writes.lock().clone()
    }

    pub fn failing() -> Self {
        let store = Self::new();
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);
        store.fail_ttl.store(true, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl KeyValueStore for ScriptedStore {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        Ok(self.raw(key))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), ttl_seconds));
        self.writes.lock().push((key.to_string(), ttl_seconds));
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        if self.fail_ttl.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        if let Some(remaining) = *self.scripted_ttl.lock() {
            return Ok(remaining);
        }
        Ok(self
            .entries
            .lock()
            .get(key)
            .map(|(_, ttl)| i64::try_from(*ttl).unwrap_or(i64::MAX))
            .unwrap_or(TTL_MISSING))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
