// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{CacheError, Result};
use config::{Config, Environment, File};
use std::path::PathBuf;

/// Plain environment variable holding the Redis connection string.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (`MARKETCACHE__SECTION__FIELD`)
    /// 2. Config file (explicit path, or `~/.marketcache/config.toml`)
    /// 3. Defaults (lowest)
    ///
    /// CLI flags are applied on top by the caller.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name(&Self::default_config_path()).required(false),
        };

        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("MARKETCACHE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| CacheError::Config(e.to_string()))?;

        let mut loaded: AppConfig = config
            .try_deserialize()
            .map_err(|e| CacheError::Config(e.to_string()))?;

        if loaded.redis.url.is_none() {
            loaded.redis.url = std::env::var(REDIS_URL_ENV).ok();
        }
        loaded.redis.url = loaded.redis.url.filter(|u| !u.trim().is_empty());

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the cache core cannot honour.
    pub fn validate(&self) -> Result<()> {
        let ratio = self.cache.swr_threshold_ratio;
        if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
            return Err(CacheError::Config(format!(
                "cache.swr_threshold_ratio must be within [0, 1], got {}",
                ratio
            )));
        }
        if self.prewarm.interval_seconds == 0 {
            return Err(CacheError::Config(
                "prewarm.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.cache.memory_capacity == 0 {
            return Err(CacheError::Config(
                "cache.memory_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".marketcache")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
