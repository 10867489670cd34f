// CLI module for marketcache
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;

/// marketcache - read-through SWR cache and prewarmer for marketplace store data
#[derive(Parser, Debug, Default)]
#[command(name = "marketcache", version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.marketcache/config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Redis connection string; leave unset to run without a shared cache
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not start the prewarm scheduler
    #[arg(long)]
    pub no_prewarm: bool,
}

impl Args {
    /// Apply flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = self.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
            config.redis.url = Some(url.to_string());
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_prewarm {
            config.prewarm.enabled = false;
        }
    }
}
