//! Axum-based HTTP server for marketcache.
//!
//! This module exposes the catalog through the read-through cache and gives
//! operators a view of the cache: popularity ranking, counters and
//! pattern invalidation.
//!
//! # Components
//!
//! - `handlers`: Implementation of individual endpoints (catalog reads, health, metrics, admin).
//! - `middleware`: Request ID layers and per-route request accounting.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{
    HealthCheck, HealthResponse, HealthStatus, InvalidateRequest, InvalidateResponse,
};
pub use routes::{create_router, AppState};
