// Error types for marketcache
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the cache core, its stores and the catalog layer.
///
/// The type is `Clone` so that one coalesced fetch can hand the same failure
/// to every waiter. Non-clonable sources are shared behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error("Cache store error: {0}")]
    Store(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wrap a producer failure so it can be shared between coalesced waiters.
    pub fn producer(err: anyhow::Error) -> Self {
        CacheError::Producer(Arc::new(err))
    }

    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            CacheError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            CacheError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
            // Producers usually fail with one of ours; report that one.
            CacheError::Producer(inner) => match inner.downcast_ref::<CacheError>() {
                Some(cause) => cause.status(),
                None => (StatusCode::BAD_GATEWAY, "upstream_error"),
            },
            CacheError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            CacheError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_error"),
            CacheError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(Arc::new(err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        CacheError::Config(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Store(err.to_string())
    }
}

// Convert CacheError to HTTP responses for Axum
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
