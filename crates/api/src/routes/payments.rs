//! Payment lookup and ingestion routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use paynotify_common::error::AppError;
use paynotify_common::types::{
    NewPayment, PaymentFilter, PaymentPage, PaymentSummary, parse_timestamp,
};
use paynotify_engine::query::{DEFAULT_PAGE_SIZE, DEFAULT_WINDOW_MINUTES, PaymentQuery};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payment/check", get(check_payment))
        .route("/api/payment/list", get(list_payments))
        .route("/api/payments", post(submit_payment))
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub create_time: Option<String>,
    pub message: Option<String>,
    pub wechat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub wechat_id: Option<String>,
    pub message: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// GET /api/payment/check — Find the payment made around an order's creation time.
async fn check_payment(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<PaymentSummary>, AppError> {
    let create_time = params
        .create_time
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("create_time is required".to_string()))?;
    let around = parse_timestamp(create_time)?;

    let found = PaymentQuery::find_by_window(
        &state.pool,
        around,
        Duration::minutes(DEFAULT_WINDOW_MINUTES),
        params.message.as_deref(),
        params.wechat_id.as_deref(),
    )
    .await?;

    found.map(Json).ok_or_else(|| {
        AppError::NotFound(format!("No payment found around {}", create_time))
    })
}

/// GET /api/payment/list — Paginated payment listing, newest first.
async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaymentPage>, AppError> {
    let filter = PaymentFilter {
        sender: params.wechat_id,
        message: params.message,
        start_time: params.start_time,
        end_time: params.end_time,
    };
    let page = PaymentQuery::list(
        &state.pool,
        &filter,
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .await?;
    Ok(Json(page))
}

/// POST /api/payments — Record a newly observed payment as a pending notification.
async fn submit_payment(
    State(state): State<AppState>,
    Json(payment): Json<NewPayment>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let inserted = state.ingestor.submit(&payment).await?;
    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "inserted": inserted }))))
}
