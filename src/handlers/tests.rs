//! # Tests for Handlers

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Json,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::Value;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::handlers::root;
use crate::server::{AppState, create_app};

async fn test_state() -> AppState {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    AppState::new(AppConfig::default(), db)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "probe-ingest");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_reports_database_ok() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn test_trace_id_is_echoed() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::get("/")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-trace-id").unwrap(), "trace-abc");
}

#[tokio::test]
async fn test_error_body_carries_request_trace_id() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::get("/api/v1/sites/NOPE/probes")
                .header("x-trace-id", "trace-404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let json = body_json(response).await;
    assert_eq!(json["trace_id"], "trace-404");
}

#[tokio::test]
async fn test_empty_ingest_body_is_rejected() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::post("/api/probe/data")
                .header("content-type", "application/xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "MALFORMED_DOCUMENT");
}

#[tokio::test]
async fn test_oversized_payload_is_413() {
    let mut config = AppConfig::default();
    config.ingest.max_payload_kb = 1;
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let app = create_app(AppState::new(config, db));

    let response = app
        .oneshot(
            Request::post("/api/probe/data")
                .header("x-trace-id", "trace-413")
                .body(Body::from(vec![b' '; 4096]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let json = body_json(response).await;
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(json["trace_id"], "trace-413");
}

#[tokio::test]
async fn test_openapi_document_lists_ingest_route() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/api/probe/data"]["post"].is_object());
    assert!(json["paths"]["/api/v1/probes/{address}/measurements"]["get"].is_object());
}
