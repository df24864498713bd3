//! Ingestion of newly observed payments.

use std::sync::Arc;

use paynotify_common::error::AppError;
use paynotify_common::types::NewPayment;

use crate::clock::Clock;
use crate::store::TaskStore;

/// Records payments as PENDING notification tasks. Safe to call repeatedly.
#[derive(Clone)]
pub struct Ingestor {
    store: TaskStore,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(store: TaskStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Store `payment` unless a payment with the same `(amount, sender, timestamp)`
    /// already exists. Returns `true` if a new task was created.
    pub async fn submit(&self, payment: &NewPayment) -> Result<bool, AppError> {
        let payment = payment.normalized();
        payment.validate()?;

        let key = payment.key();
        if self.store.exists(&key).await? {
            tracing::debug!(payment = %key, "Payment already recorded");
            return Ok(false);
        }

        let inserted = self
            .store
            .upsert_if_absent(&payment, self.clock.now())
            .await?;

        if inserted {
            tracing::info!(
                amount = %payment.amount,
                sender = %payment.sender,
                timestamp = %payment.timestamp,
                "New payment recorded"
            );
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use paynotify_common::db::memory_pool;
    use paynotify_common::types::NotifyStatus;

    use crate::clock::ManualClock;

    async fn ingestor() -> (Ingestor, TaskStore) {
        let store = TaskStore::new(memory_pool().await.unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 5).unwrap(),
        ));
        (Ingestor::new(store.clone(), clock), store)
    }

    #[tokio::test]
    async fn test_submit_twice_stores_one_row() {
        let (ingestor, store) = ingestor().await;
        let payment = NewPayment::new("1.00", "alice", "2024-01-01 10:00:00");

        assert!(ingestor.submit(&payment).await.unwrap());
        assert!(!ingestor.submit(&payment).await.unwrap());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_submit_normalizes_before_keying() {
        let (ingestor, store) = ingestor().await;
        assert!(
            ingestor
                .submit(&NewPayment::new("￥1.00", "alice", "2024-01-01 10:00:00"))
                .await
                .unwrap()
        );
        assert!(
            !ingestor
                .submit(&NewPayment::new("1.00", " alice", "2024-01-01 10:00:00"))
                .await
                .unwrap()
        );

        let key = NewPayment::new("1.00", "alice", "2024-01-01 10:00:00").key();
        let task = store.get(&key).await.unwrap().unwrap();
        assert_eq!(task.status, NotifyStatus::Pending);
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 5).unwrap()
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_payment() {
        let (ingestor, _) = ingestor().await;
        let err = ingestor
            .submit(&NewPayment::new("1.00", "alice", "yesterday"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
