//! Task store. The `payments` table is the source of truth for delivery state.
//!
//! Every operation touches a single row (or one atomic statement) and borrows a
//! connection from the pool only for its own duration.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use paynotify_common::error::AppError;
use paynotify_common::types::{NewPayment, NotificationTask, NotifyStatus, TaskKey};

/// Result of one delivery attempt, as written back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: NotifyStatus,
    pub retry_count: u32,
    pub next_retry_time: Option<DateTime<Utc>>,
    pub response: String,
    pub attempt_time: DateTime<Utc>,
    pub notify_url: Option<String>,
}

impl Outcome {
    pub fn delivered(
        retry_count: u32,
        body: String,
        attempt_time: DateTime<Utc>,
        notify_url: Option<String>,
    ) -> Self {
        Self {
            status: NotifyStatus::Delivered,
            retry_count,
            next_retry_time: None,
            response: body,
            attempt_time,
            notify_url,
        }
    }

    pub fn failed(
        retry_count: u32,
        next_retry_time: Option<DateTime<Utc>>,
        response: String,
        attempt_time: DateTime<Utc>,
        notify_url: Option<String>,
    ) -> Self {
        Self {
            status: NotifyStatus::Failed,
            retry_count,
            next_retry_time,
            response,
            attempt_time,
            notify_url,
        }
    }
}

/// `notify_status IN (..)` over the integer codes of `statuses`.
fn status_in(statuses: impl IntoIterator<Item = NotifyStatus>) -> String {
    let codes: Vec<String> = statuses
        .into_iter()
        .map(|s| s.code().to_string())
        .collect();
    format!("notify_status IN ({})", codes.join(", "))
}

/// Due-task predicate; binds `?1` = retry ceiling, `?2` = now.
fn eligible_clause() -> String {
    let dispatchable = NotifyStatus::ALL.into_iter().filter(|s| s.is_dispatchable());
    format!(
        "{} AND notify_retry_count < ?1 \
         AND (next_retry_time IS NULL OR julianday(next_retry_time) <= julianday(?2))",
        status_in(dispatchable)
    )
}

/// SQLite-backed task store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new PENDING task unless one with the same identity key exists.
    ///
    /// Returns `true` if a row was inserted. The UNIQUE constraint decides races.
    pub async fn upsert_if_absent(
        &self,
        payment: &NewPayment,
        created_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                amount, sender, timestamp, message, remark,
                created_at, notify_status, notify_retry_count, next_retry_time
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL)
            ON CONFLICT (amount, sender, timestamp) DO NOTHING
            "#,
        )
        .bind(&payment.amount)
        .bind(&payment.sender)
        .bind(&payment.timestamp)
        .bind(payment.message.as_deref().unwrap_or_default())
        .bind(payment.remark.as_deref().unwrap_or_default())
        .bind(created_at)
        .bind(NotifyStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn exists(&self, key: &TaskKey) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM payments WHERE amount = ?1 AND sender = ?2 AND timestamp = ?3",
        )
        .bind(&key.amount)
        .bind(&key.sender)
        .bind(&key.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn get(&self, key: &TaskKey) -> Result<Option<NotificationTask>, AppError> {
        let task = sqlx::query_as::<_, NotificationTask>(
            "SELECT * FROM payments WHERE amount = ?1 AND sender = ?2 AND timestamp = ?3",
        )
        .bind(&key.amount)
        .bind(&key.sender)
        .bind(&key.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// Tasks due for an attempt at `now`, oldest first, at most `limit`.
    pub async fn select_eligible(
        &self,
        max_retry: u32,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationTask>, AppError> {
        let eligible = eligible_clause();
        let sql = format!(
            r#"
            SELECT * FROM payments
            WHERE {eligible}
            ORDER BY julianday(created_at) ASC, id ASC
            LIMIT ?3
            "#
        );

        let tasks = sqlx::query_as::<_, NotificationTask>(&sql)
            .bind(max_retry)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(tasks)
    }

    /// Like [`select_eligible`](Self::select_eligible), but also skips tasks whose
    /// claim lease is still running and leases the returned ones until `claimed_until`.
    ///
    /// Selection and lease happen in one statement, so two concurrent scans never
    /// return the same task.
    pub async fn claim_eligible(
        &self,
        max_retry: u32,
        now: DateTime<Utc>,
        limit: i64,
        claimed_until: DateTime<Utc>,
    ) -> Result<Vec<NotificationTask>, AppError> {
        let eligible = eligible_clause();
        let sql = format!(
            r#"
            UPDATE payments SET claimed_until = ?4
            WHERE id IN (
                SELECT id FROM payments
                WHERE {eligible}
                  AND (claimed_until IS NULL OR julianday(claimed_until) <= julianday(?2))
                ORDER BY julianday(created_at) ASC, id ASC
                LIMIT ?3
            )
            RETURNING *
            "#
        );

        let mut tasks = sqlx::query_as::<_, NotificationTask>(&sql)
            .bind(max_retry)
            .bind(now)
            .bind(limit)
            .bind(claimed_until)
            .fetch_all(&self.pool)
            .await?;

        // RETURNING does not preserve the subquery's order.
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Persist the outcome of an attempt and release any claim lease.
    ///
    /// Returns `false` when nothing was updated: the row is gone or already
    /// DELIVERED, which is terminal.
    pub async fn record_outcome(&self, key: &TaskKey, outcome: &Outcome) -> Result<bool, AppError> {
        // Rows may only be updated from statuses that allow the recorded transition.
        let sources: Vec<NotifyStatus> = NotifyStatus::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(outcome.status))
            .collect();
        if sources.is_empty() {
            return Err(AppError::Validation(format!(
                "no task may move to {}",
                outcome.status
            )));
        }
        if let Some(next) = outcome.next_retry_time
            && next < outcome.attempt_time
        {
            return Err(AppError::Validation(format!(
                "next retry time {} precedes attempt time {}",
                next, outcome.attempt_time
            )));
        }

        let sql = format!(
            r#"
            UPDATE payments
            SET notify_status = ?1,
                notify_retry_count = ?2,
                next_retry_time = ?3,
                notify_response = ?4,
                notify_time = ?5,
                notify_url = ?6,
                claimed_until = NULL
            WHERE amount = ?7 AND sender = ?8 AND timestamp = ?9
              AND {guard}
            "#,
            guard = status_in(sources)
        );

        let result = sqlx::query(&sql)
            .bind(outcome.status)
            .bind(outcome.retry_count)
            .bind(outcome.next_retry_time)
            .bind(&outcome.response)
            .bind(outcome.attempt_time)
            .bind(outcome.notify_url.as_deref())
            .bind(&key.amount)
            .bind(&key.sender)
            .bind(&key.timestamp)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
