//! Read-only queries over stored payments, used by the HTTP API.

use chrono::{Duration, NaiveDateTime};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use paynotify_common::error::AppError;
use paynotify_common::types::{
    PaymentFilter, PaymentListItem, PaymentPage, PaymentSummary, TIMESTAMP_FORMAT,
};

/// Default tolerance around an order's creation time when matching a payment.
pub const DEFAULT_WINDOW_MINUTES: i64 = 10;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Service layer for payment lookups.
pub struct PaymentQuery;

impl PaymentQuery {
    /// Earliest payment whose timestamp lies within `tolerance` of `around`,
    /// optionally narrowed by substring matches on message and sender.
    pub async fn find_by_window(
        pool: &SqlitePool,
        around: NaiveDateTime,
        tolerance: Duration,
        message: Option<&str>,
        sender: Option<&str>,
    ) -> Result<Option<PaymentSummary>, AppError> {
        let from = (around - tolerance).format(TIMESTAMP_FORMAT).to_string();
        let to = (around + tolerance).format(TIMESTAMP_FORMAT).to_string();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT amount, sender, timestamp, message, remark FROM payments WHERE timestamp BETWEEN ",
        );
        qb.push_bind(from).push(" AND ").push_bind(to);

        if let Some(message) = message.filter(|m| !m.is_empty()) {
            qb.push(" AND message LIKE ").push_bind(format!("%{}%", message));
        }
        if let Some(sender) = sender.filter(|s| !s.is_empty()) {
            qb.push(" AND sender LIKE ").push_bind(format!("%{}%", sender));
        }
        qb.push(" ORDER BY timestamp ASC, id ASC LIMIT 1");

        let summary = qb
            .build_query_as::<PaymentSummary>()
            .fetch_optional(pool)
            .await?;

        Ok(summary)
    }

    /// One page of payments, newest timestamp first.
    ///
    /// `page` starts at 1; out-of-range values are clamped rather than rejected.
    pub async fn list(
        pool: &SqlitePool,
        filter: &PaymentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<PaymentPage, AppError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM payments WHERE 1=1");
        push_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;

        let mut rows: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT amount, sender, timestamp, message, notify_status FROM payments WHERE 1=1",
        );
        push_filters(&mut rows, filter);
        rows.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(offset);
        let list = rows
            .build_query_as::<PaymentListItem>()
            .fetch_all(pool)
            .await?;

        Ok(PaymentPage {
            total,
            page,
            page_size,
            list,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PaymentFilter) {
    if let Some(sender) = filter.sender.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND sender LIKE ").push_bind(format!("%{}%", sender));
    }
    if let Some(message) = filter.message.as_deref().filter(|m| !m.is_empty()) {
        qb.push(" AND message LIKE ").push_bind(format!("%{}%", message));
    }
    if let Some(start) = filter.start_time.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND timestamp >= ").push_bind(start.to_string());
    }
    if let Some(end) = filter.end_time.as_deref().filter(|e| !e.is_empty()) {
        qb.push(" AND timestamp <= ").push_bind(end.to_string());
    }
}
