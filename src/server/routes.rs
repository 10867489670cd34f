// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    health_handler, invalidate_handler, metrics_handler, products_handler, stats_handler,
    store_handler, top_tenants_handler,
};
use super::middleware::{request_id_layers, track_requests};
use crate::cache::CacheService;
use crate::catalog::CatalogService;
use crate::config::AppConfig;
use crate::error::Result;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: CacheService,
    pub catalog: CatalogService,
}

pub fn create_router(
    config: AppConfig,
    cache: CacheService,
    catalog: CatalogService,
) -> Result<Router> {
    let state = AppState {
        config: Arc::new(config),
        cache,
        catalog,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/stores/:tenant", get(store_handler))
        .route("/v1/stores/:tenant/products", get(products_handler))
        .route("/admin/cache/top", get(top_tenants_handler))
        .route("/admin/cache/stats", get(stats_handler))
        .route("/admin/cache/invalidate", post(invalidate_handler))
        .route_layer(from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
