//! Loader: periodically moves due tasks from the store onto the dispatch queue.
//!
//! The loader only reads the store (unless claim leases are enabled), so it runs
//! independently of worker throughput. Without leases the same due task can be
//! queued again by the next scan before its first outcome is written; delivery
//! is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use paynotify_common::types::NotificationTask;

use crate::clock::Clock;
use crate::queue::{QueueSender, QueuedTask};
use crate::store::TaskStore;

pub struct Loader {
    store: TaskStore,
    queue: QueueSender,
    clock: Arc<dyn Clock>,
    max_retry: u32,
    batch_size: i64,
    interval: Duration,
    claim_ttl: Option<Duration>,
}

impl Loader {
    pub fn new(
        store: TaskStore,
        queue: QueueSender,
        clock: Arc<dyn Clock>,
        max_retry: u32,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            max_retry,
            batch_size: batch_size as i64,
            interval,
            claim_ttl: None,
        }
    }

    /// Lease loaded tasks for `ttl` so later scans skip them until their outcome is recorded.
    pub fn with_claim_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Run scans until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            max_retry = self.max_retry,
            claim_lease = self.claim_ttl.is_some(),
            "Task loader started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.load_once() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Task loader stopped");
    }

    /// One scan: select due tasks and queue them. Returns how many were queued.
    ///
    /// Storage errors are logged and the scan is skipped; the tasks stay due.
    pub async fn load_once(&self) -> usize {
        let now = self.clock.now();

        let selected = match self.claim_ttl {
            None => {
                self.store
                    .select_eligible(self.max_retry, now, self.batch_size)
                    .await
            }
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => {
                    self.store
                        .claim_eligible(self.max_retry, now, self.batch_size, now + ttl)
                        .await
                }
                Err(e) => {
                    tracing::error!(error = %e, "Claim lease out of range, skipping scan");
                    return 0;
                }
            },
        };

        let tasks = match selected {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load pending notifications");
                return 0;
            }
        };

        let mut queued = 0;
        for task in tasks {
            if self.schedule_task(task) {
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::info!(count = queued, "Loaded pending notifications");
        }
        queued
    }

    /// Queue a task at its current retry count, unless its retries are exhausted.
    pub fn schedule_task(&self, task: NotificationTask) -> bool {
        let retry_count = task.retry_count;
        if retry_count >= self.max_retry {
            tracing::debug!(
                payment = %task.key(),
                retry_count,
                "Retries exhausted, not scheduling"
            );
            return false;
        }

        let key = task.key();
        if !self.queue.push(QueuedTask { task, retry_count }) {
            tracing::warn!(payment = %key, "Dispatch queue closed, task dropped");
            return false;
        }

        tracing::info!(
            payment = %key,
            attempt = retry_count + 1,
            "Notification scheduled"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use paynotify_common::db::memory_pool;
    use paynotify_common::types::NewPayment;

    use crate::clock::ManualClock;
    use crate::queue::dispatch_queue;
    use crate::store::Outcome;

    async fn setup(
        max_retry: u32,
        batch: usize,
    ) -> (Loader, TaskStore, crate::queue::QueueReceiver) {
        let store = TaskStore::new(memory_pool().await.unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        ));
        let (tx, rx) = dispatch_queue();
        let loader = Loader::new(
            store.clone(),
            tx,
            clock,
            max_retry,
            batch,
            Duration::from_millis(10),
        );
        (loader, store, rx)
    }

    async fn insert(store: &TaskStore, sender: &str) -> NewPayment {
        let payment = NewPayment::new("1.00", sender, "2024-01-01 10:00:00");
        store
            .upsert_if_absent(&payment, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
            .await
            .unwrap();
        payment
    }

    #[tokio::test]
    async fn test_load_once_queues_due_tasks_with_retry_count() {
        let (loader, store, rx) = setup(7, 20).await;
        insert(&store, "alice").await;
        let bob = insert(&store, "bob").await;
        let failed = Outcome::failed(
            2,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()),
            "HTTP 500".into(),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 29, 0).unwrap(),
            None,
        );
        store.record_outcome(&bob.key(), &failed).await.unwrap();

        assert_eq!(loader.load_once().await, 2);
        let first = rx.try_pop().unwrap();
        let second = rx.try_pop().unwrap();
        assert_eq!((first.task.sender.as_str(), first.retry_count), ("alice", 0));
        assert_eq!((second.task.sender.as_str(), second.retry_count), ("bob", 2));
    }

    #[tokio::test]
    async fn test_batch_size_caps_a_scan() {
        let (loader, store, rx) = setup(7, 2).await;
        for sender in ["a", "b", "c"] {
            insert(&store, sender).await;
        }
        assert_eq!(loader.load_once().await, 2);
        assert_eq!(rx.len(), 2);
    }

    #[tokio::test]
    async fn test_without_lease_the_same_task_is_queued_again() {
        let (loader, store, rx) = setup(7, 20).await;
        insert(&store, "alice").await;
        assert_eq!(loader.load_once().await, 1);
        assert_eq!(loader.load_once().await, 1);
        assert_eq!(rx.len(), 2);
    }

    #[tokio::test]
    async fn test_with_lease_the_same_task_is_queued_once() {
        let (loader, store, rx) = setup(7, 20).await;
        let loader = loader.with_claim_ttl(Some(Duration::from_secs(60)));
        insert(&store, "alice").await;
        assert_eq!(loader.load_once().await, 1);
        assert_eq!(loader.load_once().await, 0);
        assert_eq!(rx.len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_task_drops_exhausted_tasks() {
        let (loader, store, rx) = setup(3, 20).await;
        let payment = insert(&store, "alice").await;
        let mut task = store.get(&payment.key()).await.unwrap().unwrap();
        task.retry_count = 3;
        assert!(!loader.schedule_task(task));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (loader, store, rx) = setup(7, 20).await;
        insert(&store, "alice").await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(loader.run(shutdown.clone()));

        let first = tokio::time::timeout(Duration::from_secs(2), rx.pop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.task.sender, "alice");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
