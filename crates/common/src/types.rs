use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Format of the payment `timestamp` field as rendered by the payment source.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Webhook delivery status, persisted as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum NotifyStatus {
    Pending = 0,
    Delivered = 1,
    Failed = 2,
}

impl NotifyStatus {
    pub const ALL: [NotifyStatus; 3] = [
        NotifyStatus::Pending,
        NotifyStatus::Delivered,
        NotifyStatus::Failed,
    ];

    /// Integer code stored in the `notify_status` column.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether a recorded outcome may move a task from `self` to `next`.
    ///
    /// `Delivered` is terminal, and nothing ever moves back to `Pending`.
    pub fn can_transition_to(self, next: NotifyStatus) -> bool {
        match (self, next) {
            (NotifyStatus::Delivered, _) => false,
            (_, NotifyStatus::Pending) => false,
            (NotifyStatus::Pending | NotifyStatus::Failed, _) => true,
        }
    }

    /// Statuses the loader considers for (re)delivery.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, NotifyStatus::Pending | NotifyStatus::Failed)
    }
}

impl std::fmt::Display for NotifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyStatus::Pending => write!(f, "pending"),
            NotifyStatus::Delivered => write!(f, "delivered"),
            NotifyStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Natural identity of a payment: `(amount, sender, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub amount: String,
    pub sender: String,
    pub timestamp: String,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {} - {}", self.amount, self.sender, self.timestamp)
    }
}

/// A payment as reported by the discovery collaborator, before ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: String,
    pub sender: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl NewPayment {
    pub fn new(amount: &str, sender: &str, timestamp: &str) -> Self {
        Self {
            amount: amount.to_string(),
            sender: sender.to_string(),
            timestamp: timestamp.to_string(),
            message: None,
            remark: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_remark(mut self, remark: &str) -> Self {
        self.remark = Some(remark.to_string());
        self
    }

    /// Trim every field and strip the currency sign the payment source prefixes amounts with.
    pub fn normalized(&self) -> Self {
        let amount = self.amount.trim();
        let amount = amount
            .strip_prefix('￥')
            .or_else(|| amount.strip_prefix('¥'))
            .unwrap_or(amount)
            .trim();

        Self {
            amount: amount.to_string(),
            sender: self.sender.trim().to_string(),
            timestamp: self.timestamp.trim().to_string(),
            message: self.message.as_deref().map(|m| m.trim().to_string()),
            remark: self.remark.as_deref().map(|r| r.trim().to_string()),
        }
    }

    /// Reject records that cannot form a valid identity key.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount.is_empty() {
            return Err(AppError::Validation("amount must not be empty".to_string()));
        }
        if self.sender.is_empty() {
            return Err(AppError::Validation("sender must not be empty".to_string()));
        }
        parse_timestamp(&self.timestamp)?;
        Ok(())
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            amount: self.amount.clone(),
            sender: self.sender.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Parse a payment timestamp in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| {
        AppError::Validation(format!(
            "Invalid timestamp '{}', expected YYYY-MM-DD HH:MM:SS",
            raw
        ))
    })
}

/// A persisted payment together with the state of its webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationTask {
    /// Surrogate row id, never used for identity.
    pub id: i64,
    pub amount: String,
    pub sender: String,
    pub timestamp: String,
    pub message: String,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(rename = "notify_status")]
    pub status: NotifyStatus,
    #[sqlx(rename = "notify_retry_count")]
    pub retry_count: u32,
    pub next_retry_time: Option<DateTime<Utc>>,
    #[sqlx(rename = "notify_response")]
    pub last_response: Option<String>,
    #[sqlx(rename = "notify_time")]
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub notify_url: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

impl NotificationTask {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            amount: self.amount.clone(),
            sender: self.sender.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Single-payment view returned by the window lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentSummary {
    pub amount: String,
    pub sender: String,
    pub timestamp: String,
    pub message: String,
    pub remark: String,
}

/// Row of a paginated payment listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentListItem {
    pub amount: String,
    pub sender: String,
    pub timestamp: String,
    pub message: String,
    pub notify_status: NotifyStatus,
}

/// One page of payments, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPage {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub list: Vec<PaymentListItem>,
}

/// Optional substring / range filters for payment listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    /// Substring match on the sender
    pub sender: Option<String>,
    /// Substring match on the payer's message
    pub message: Option<String>,
    /// Inclusive lower bound on `timestamp`
    pub start_time: Option<String>,
    /// Inclusive upper bound on `timestamp`
    pub end_time: Option<String>,
}
