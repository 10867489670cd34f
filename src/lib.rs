// marketcache - read-through SWR cache with request coalescing and popularity-driven prewarming
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod prewarm;
pub mod server;
pub mod store;
pub mod utils;
