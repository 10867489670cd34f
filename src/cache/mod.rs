// Cache core module
// Author: kelexine (https://github.com/kelexine)

pub mod models;
pub mod options;
pub mod service;
pub mod tracker;

pub use models::CacheStats;
pub use options::{CacheOptions, CachePolicy, ResolvedOptions, DEFAULT_SWR_THRESHOLD_RATIO, DEFAULT_TTL_SECONDS};
pub use service::CacheService;
pub use tracker::{AccessMeta, AccessStat, AccessTracker, DEFAULT_TOP_TENANTS};
