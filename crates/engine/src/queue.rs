//! Dispatch queue between the loader and the workers.
//!
//! Unbounded FIFO backed by a tokio mpsc channel. The loader pushes without
//! blocking; workers share the receiving end and wait when it is empty.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use paynotify_common::types::NotificationTask;

/// A task on its way to a worker, with the retry count it was loaded at.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: NotificationTask,
    pub retry_count: u32,
}

/// Create a connected sender/receiver pair.
pub fn dispatch_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<QueuedTask>,
}

impl QueueSender {
    /// Enqueue without waiting. Returns `false` if every receiver is gone.
    pub fn push(&self, item: QueuedTask) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Receiving end shared by all workers.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedTask>>>,
}

impl QueueReceiver {
    /// Wait for the next task. `None` once all senders are dropped and the queue is drained.
    pub async fn pop(&self) -> Option<QueuedTask> {
        self.rx.lock().await.recv().await
    }

    /// Take the next task if one is already waiting.
    pub fn try_pop(&self) -> Option<QueuedTask> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Number of tasks waiting. Returns 0 while a worker is blocked on the queue.
    pub fn len(&self) -> usize {
        self.rx.try_lock().map(|rx| rx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paynotify_common::types::NotifyStatus;
    use std::time::Duration;

    fn item(sender: &str, retry_count: u32) -> QueuedTask {
        QueuedTask {
            task: NotificationTask {
                id: 0,
                amount: "1.00".to_string(),
                sender: sender.to_string(),
                timestamp: "2024-01-01 10:00:00".to_string(),
                message: String::new(),
                remark: String::new(),
                created_at: Utc::now(),
                status: NotifyStatus::Pending,
                retry_count,
                next_retry_time: None,
                last_response: None,
                last_attempt_time: None,
                notify_url: None,
                claimed_until: None,
            },
            retry_count,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = dispatch_queue();
        assert!(tx.push(item("a", 0)));
        assert!(tx.push(item("b", 1)));
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.pop().await.unwrap().task.sender, "a");
        let second = rx.pop().await.unwrap();
        assert_eq!(second.task.sender, "b");
        assert_eq!(second.retry_count, 1);
        assert!(rx.is_empty());
        assert!(rx.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_push_wakes_waiting_consumer() {
        let (tx, rx) = dispatch_queue();
        let waiter = tokio::spawn({
            let rx = rx.clone();
            async move { rx.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.push(item("late", 0));

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.task.sender, "late");
    }

    #[tokio::test]
    async fn test_each_task_reaches_one_consumer() {
        let (tx, rx) = dispatch_queue();
        for i in 0..20 {
            tx.push(item(&format!("s{}", i), 0));
        }
        drop(tx);

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let rx = rx.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = rx.pop().await {
                    seen.push(item.task.sender);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn test_push_fails_when_receivers_dropped() {
        let (tx, rx) = dispatch_queue();
        drop(rx);
        assert!(!tx.push(item("a", 0)));
    }
}
