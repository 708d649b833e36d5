#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use metricwatch_api::config::{LogFormat, ServerConfig};
use metricwatch_api::middleware::context::ACCOUNT_HEADER;
use metricwatch_api::router::build_app_router;
use metricwatch_api::service::MonitoringService;
use metricwatch_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and no state file.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        default_account_id: "000000000000".to_string(),
        default_region: "us-east-1".to_string(),
        alarm_query_timeout_ms: 1000,
        metrics_retention_hours: 336,
        state_file: None,
        log_format: LogFormat::Text,
    }
}

/// Same as [`test_config`] with persistence to `path`.
pub fn test_config_with_state_file(path: PathBuf) -> ServerConfig {
    ServerConfig {
        state_file: Some(path),
        ..test_config()
    }
}

/// Build the full application router with all middleware layers, exactly
/// as `main.rs` does, plus a handle on the service behind it.
pub fn build_test_app_with(config: ServerConfig) -> (Router, Arc<MonitoringService>) {
    let service = Arc::new(MonitoringService::new(&config));
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::clone(&service),
    };
    (build_app_router(state, &config), service)
}

pub fn build_test_app() -> Router {
    build_test_app_with(test_config()).0
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST as a specific account (default region).
pub async fn post_json_as(app: Router, account: &str, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header(ACCOUNT_HEADER, account)
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect the body and parse it as JSON. An empty body is `Value::Null`.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
