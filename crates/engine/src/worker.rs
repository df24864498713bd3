//! Delivery workers.
//!
//! Each worker pops a task, posts the signed webhook and writes the outcome
//! back. A failure never escapes the task it belongs to: transport errors,
//! rejections and storage errors are logged and the worker moves on.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use paynotify_notifier::WebhookClient;

use crate::backoff::BackoffSchedule;
use crate::clock::Clock;
use crate::queue::{QueueReceiver, QueuedTask};
use crate::store::{Outcome, TaskStore};

pub struct Worker {
    id: usize,
    store: TaskStore,
    queue: QueueReceiver,
    client: WebhookClient,
    backoff: Arc<BackoffSchedule>,
    clock: Arc<dyn Clock>,
}

impl Worker {
    pub fn new(
        id: usize,
        store: TaskStore,
        queue: QueueReceiver,
        client: WebhookClient,
        backoff: Arc<BackoffSchedule>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            store,
            queue,
            client,
            backoff,
            clock,
        }
    }

    /// Process tasks until `shutdown` is cancelled or the queue closes.
    ///
    /// A request still in flight at cancellation is abandoned and its outcome
    /// is never recorded; the task stays due and is picked up after restart.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::debug!(worker = self.id, "Delivery worker started");

        loop {
            let item = tokio::select! {
                _ = shutdown.cancelled() => break,
                item = self.queue.pop() => item,
            };

            let Some(item) = item else {
                tracing::debug!(worker = self.id, "Dispatch queue closed");
                break;
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.process(item) => {}
            }
        }

        tracing::debug!(worker = self.id, "Delivery worker stopped");
    }

    /// Attempt one delivery and record its outcome.
    pub async fn process(&self, item: QueuedTask) -> Outcome {
        let key = item.task.key();
        let endpoint = Some(self.client.endpoint().to_string());
        let result = self.client.deliver(&item.task).await;
        let attempt_time = self.clock.now();

        let outcome = match result {
            Ok(body) => {
                tracing::info!(
                    worker = self.id,
                    payment = %key,
                    endpoint = self.client.endpoint(),
                    "Notification delivered"
                );
                Outcome::delivered(item.retry_count, body, attempt_time, endpoint)
            }
            Err(e) => {
                let retry_count = item.retry_count + 1;
                // No delay past the end of the table: the row is already at the ceiling.
                let next_retry_time = self
                    .backoff
                    .next_retry_time(retry_count, attempt_time)
                    .or(Some(attempt_time));

                tracing::warn!(
                    worker = self.id,
                    payment = %key,
                    attempt = retry_count,
                    error = %e,
                    "Notification attempt failed"
                );

                Outcome::failed(
                    retry_count,
                    next_retry_time,
                    format!("attempt {} failed: {}", retry_count, e),
                    attempt_time,
                    endpoint,
                )
            }
        };

        match self.store.record_outcome(&key, &outcome).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                worker = self.id,
                payment = %key,
                "Outcome not recorded, task already delivered"
            ),
            Err(e) => tracing::error!(
                worker = self.id,
                payment = %key,
                error = %e,
                "Failed to update notification status"
            ),
        }

        outcome
    }
}
