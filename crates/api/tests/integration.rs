//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to drive the Axum router against an in-memory
//! SQLite database, no server or external services needed.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use paynotify_api::routes::create_router;
use paynotify_api::state::AppState;
use paynotify_common::config::AppConfig;
use paynotify_common::db::memory_pool;
use paynotify_engine::clock::SystemClock;
use paynotify_engine::ingest::Ingestor;
use paynotify_engine::store::TaskStore;

// ============================================================
// Helpers
// ============================================================

async fn build_app() -> Router {
    build_app_with(AppConfig::default()).await
}

async fn build_app_with(config: AppConfig) -> Router {
    let pool = memory_pool().await.unwrap();
    let ingestor = Ingestor::new(TaskStore::new(pool.clone()), Arc::new(SystemClock));
    create_router(AppState::new(pool, config, ingestor))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post_payment(app: &Router, payment: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments")
                .header("Content-Type", "application/json")
                .body(Body::from(payment.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn seed(app: &Router) {
    let payments = [
        serde_json::json!({
            "amount": "￥1.00",
            "sender": "alice",
            "timestamp": "2024-01-01 10:00:00",
            "message": "order-1"
        }),
        serde_json::json!({
            "amount": "2.00",
            "sender": "bob",
            "timestamp": "2024-01-01 10:05:00",
            "message": "order-2"
        }),
        serde_json::json!({
            "amount": "3.00",
            "sender": "carol",
            "timestamp": "2024-01-02 08:00:00"
        }),
    ];
    for payment in payments {
        let (status, _) = post_payment(app, payment).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

// ============================================================
// Health & service status
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_app().await;
    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "paynotify");
}

#[tokio::test]
async fn test_service_status() {
    let app = build_app().await;
    let (status, json) = get(&app, "/api/service/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");
    assert_eq!(json["delivery_enabled"], false);
    assert_eq!(json["concurrency"], 10);
    assert_eq!(json["max_retry"], 7);
    assert!(json["pid"].as_u64().is_some());
}

#[tokio::test]
async fn test_service_status_reports_enforced_retry_ceiling() {
    let app = build_app_with(AppConfig {
        notify_max_retry: 50,
        notify_url: Some("http://merchant.test/notify".to_string()),
        notify_key: Some("secret".to_string()),
        ..AppConfig::default()
    })
    .await;
    let (status, json) = get(&app, "/api/service/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["delivery_enabled"], true);
    assert_eq!(json["max_retry"], 7);
}

// ============================================================
// Ingestion
// ============================================================

#[tokio::test]
async fn test_submit_is_idempotent() {
    let app = build_app().await;
    let payment = serde_json::json!({
        "amount": "￥1.00",
        "sender": "alice",
        "timestamp": "2024-01-01 10:00:00"
    });

    let (status, json) = post_payment(&app, payment).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["inserted"], true);

    // Same identity once normalized.
    let again = serde_json::json!({
        "amount": " 1.00 ",
        "sender": "alice",
        "timestamp": "2024-01-01 10:00:00"
    });
    let (status, json) = post_payment(&app, again).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["inserted"], false);
}

#[tokio::test]
async fn test_submit_rejects_invalid_payment() {
    let app = build_app().await;

    let (status, json) = post_payment(
        &app,
        serde_json::json!({"amount": "1.00", "sender": "alice", "timestamp": "yesterday"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("yesterday"));

    let (status, _) = post_payment(
        &app,
        serde_json::json!({"amount": "1.00", "sender": "  ", "timestamp": "2024-01-01 10:00:00"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================
// Lookups
// ============================================================

#[tokio::test]
async fn test_check_finds_payment_in_window() {
    let app = build_app().await;
    seed(&app).await;

    let (status, json) = get(&app, "/api/payment/check?create_time=2024-01-01%2010:03:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount"], "1.00");
    assert_eq!(json["sender"], "alice");

    let (status, json) = get(
        &app,
        "/api/payment/check?create_time=2024-01-01%2010:03:00&message=order-2&wechat_id=bob",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount"], "2.00");
}

#[tokio::test]
async fn test_check_errors() {
    let app = build_app().await;
    seed(&app).await;

    let (status, _) = get(&app, "/api/payment/check").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/api/payment/check?create_time=not-a-time").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get(&app, "/api/payment/check?create_time=2023-06-01%2000:00:00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_list_pages_and_filters() {
    let app = build_app().await;
    seed(&app).await;

    let (status, json) = get(&app, "/api/payment/list?page=1&page_size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["page"], 1);
    assert_eq!(json["page_size"], 2);
    let list = json["list"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["sender"], "carol");
    assert_eq!(list[0]["notify_status"], "pending");

    let (status, json) = get(
        &app,
        "/api/payment/list?wechat_id=ali&end_time=2024-01-01%2023:59:59",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["list"][0]["message"], "order-1");
}
