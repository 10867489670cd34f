// Error handling tests
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::IntoResponse;
use marketcache::error::CacheError;
use std::sync::Arc;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        CacheError::InvalidKey("empty".to_string()),
        CacheError::producer(anyhow::anyhow!("listing failed")),
        CacheError::Store("connection refused".to_string()),
        CacheError::Upstream("HTTP 502".to_string()),
        CacheError::NotFound("store ghost".to_string()),
        CacheError::Config("bad ratio".to_string()),
        CacheError::Internal("task aborted".to_string()),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_producer_error_keeps_cause() {
    let error = CacheError::producer(anyhow::anyhow!("marketplace API down"));
    assert!(format!("{}", error).contains("marketplace API down"));
}

#[test]
fn test_clones_share_producer_error() {
    let error = CacheError::producer(anyhow::anyhow!("boom"));
    let clone = error.clone();
    match (error, clone) {
        (CacheError::Producer(a), CacheError::Producer(b)) => assert!(Arc::ptr_eq(&a, &b)),
        _ => panic!("expected producer errors"),
    }
}

#[test]
fn test_serialization_error_conversion() {
    let err = serde_json::from_str::<u32>("not json").unwrap_err();
    let error: CacheError = err.into();
    assert!(matches!(error, CacheError::Serialization(_)));
}

#[tokio::test]
async fn test_error_response_status_codes() {
    let cases = vec![
        (CacheError::InvalidKey("empty".into()), StatusCode::BAD_REQUEST),
        (CacheError::NotFound("ghost".into()), StatusCode::NOT_FOUND),
        (CacheError::Upstream("HTTP 500".into()), StatusCode::BAD_GATEWAY),
        (CacheError::Store("down".into()), StatusCode::SERVICE_UNAVAILABLE),
        (CacheError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (
            CacheError::producer(anyhow::anyhow!("opaque failure")),
            StatusCode::BAD_GATEWAY,
        ),
        // a wrapped catalog error keeps its own status
        (
            CacheError::producer(CacheError::NotFound("ghost".into()).into()),
            StatusCode::NOT_FOUND,
        ),
    ];

    for (error, expected) in cases {
        let response = error.into_response();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn test_error_response_envelope() {
    let response = CacheError::InvalidKey("pattern must not be empty".into()).into_response();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("pattern must not be empty"));
}
