// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::cache::{AccessStat, CacheStats};
use crate::error::{CacheError, Result};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // Running without a store is allowed, but every read goes upstream
    let store_check = match state.cache.backend_name() {
        Some(backend) => HealthCheck {
            status: "ok".to_string(),
            message: format!("{} store attached", backend),
        },
        None => {
            overall_status = HealthStatus::Degraded;
            HealthCheck {
                status: "warning".to_string(),
                message: "No cache store, serving uncached".to_string(),
            }
        }
    };
    checks.insert("cache_store".to_string(), store_check);

    let prewarm = &state.config.prewarm;
    let prewarm_check = HealthCheck {
        status: "ok".to_string(),
        message: if prewarm.enabled {
            format!(
                "Top {} tenants every {}s",
                prewarm.top_n, prewarm.interval_seconds
            )
        } else {
            "Disabled".to_string()
        },
    };
    checks.insert("prewarm".to_string(), prewarm_check);

    let upstream_check = HealthCheck {
        status: "ok".to_string(),
        message: format!("API base: {}", state.config.upstream.base_url),
    };
    checks.insert("upstream".to_string(), upstream_check);

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// GET /v1/stores/:tenant
pub async fn store_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<Value>> {
    let listing = state.catalog.store_listing(&tenant, query.refresh).await?;
    Ok(Json(listing))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub page: Option<u32>,
    #[serde(default)]
    pub refresh: bool,
}

/// GET /v1/stores/:tenant/products?page=N
pub async fn products_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<Value>> {
    let page = query.page.unwrap_or(1);
    let products = state
        .catalog
        .product_page(&tenant, page, query.refresh)
        .await?;
    Ok(Json(products))
}

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TopTenantsResponse {
    pub tenants: Vec<AccessStat>,
}

/// GET /admin/cache/top?limit=N
pub async fn top_tenants_handler(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Json<TopTenantsResponse> {
    Json(TopTenantsResponse {
        tenants: state.cache.list_top_tenants(query.limit),
    })
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub backend: Option<&'static str>,
    pub stats: CacheStats,
    pub in_flight: usize,
    pub refreshing: usize,
    pub tracked_tenants: usize,
}

/// GET /admin/cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = &state.cache;
    Json(StatsResponse {
        backend: cache.backend_name(),
        stats: cache.stats(),
        in_flight: cache.in_flight(),
        refreshing: cache.refreshing(),
        tracked_tenants: cache.tracker().len(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub deleted: u64,
}

/// POST /admin/cache/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let pattern = request.pattern.trim();
    if pattern.is_empty() {
        return Err(CacheError::InvalidKey(
            "pattern must not be empty".to_string(),
        ));
    }

    info!("Admin invalidation requested for pattern={}", pattern);
    let deleted = state.cache.invalidate_by_pattern(pattern).await;
    Ok(Json(InvalidateResponse { deleted }))
}
