//! Lifecycle of the delivery engine: one loader plus a fixed pool of workers.
//!
//! All units share the dispatch queue and a single cancellation token.
//! `stop` cancels the token and waits for every unit; a task already popped
//! but not yet recorded is abandoned and stays due in the store.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use paynotify_common::config::{AppConfig, DeliveryTarget};
use paynotify_common::error::AppError;
use paynotify_notifier::WebhookClient;

use crate::backoff::BackoffSchedule;
use crate::clock::{Clock, SystemClock};
use crate::ingest::Ingestor;
use crate::loader::Loader;
use crate::queue::dispatch_queue;
use crate::store::TaskStore;
use crate::worker::Worker;

/// Tunables of the delivery engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Delivery attempts allowed per task
    pub max_retry: u32,
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Pause between two loader scans
    pub loader_interval: Duration,
    /// Webhook request timeout
    pub request_timeout: Duration,
    /// Claim lease length; `None` keeps plain at-least-once dispatch
    pub claim_ttl: Option<Duration>,
    pub backoff: BackoffSchedule,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retry: config.notify_max_retry,
            concurrency: config.notify_concurrency,
            loader_interval: config.loader_interval(),
            request_timeout: config.request_timeout(),
            claim_ttl: config.claim_ttl(),
            backoff: BackoffSchedule::default(),
        }
    }

    /// Loader batch: enough to keep every worker busy for two rounds.
    pub fn batch_size(&self) -> usize {
        self.concurrency.max(1) * 2
    }

    /// Retry ceiling, clamped so every failure has a defined backoff.
    pub fn effective_max_retry(&self) -> u32 {
        self.backoff.effective_ceiling(self.max_retry)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Running loader and workers. Pass to [`NotificationEngine::stop`].
#[derive(Debug)]
pub struct EngineHandles {
    shutdown: CancellationToken,
    loader: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl EngineHandles {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

pub struct NotificationEngine {
    store: TaskStore,
    settings: EngineSettings,
    target: Option<DeliveryTarget>,
    clock: Arc<dyn Clock>,
}

impl NotificationEngine {
    pub fn new(pool: SqlitePool, settings: EngineSettings, target: Option<DeliveryTarget>) -> Self {
        Self::with_clock(pool, settings, target, Arc::new(SystemClock))
    }

    pub fn from_config(pool: SqlitePool, config: &AppConfig) -> Self {
        Self::new(pool, EngineSettings::from_config(config), config.delivery())
    }

    pub fn with_clock(
        pool: SqlitePool,
        settings: EngineSettings,
        target: Option<DeliveryTarget>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let effective = settings.effective_max_retry();
        if effective < settings.max_retry {
            tracing::warn!(
                configured = settings.max_retry,
                effective,
                "Retry ceiling exceeds the backoff table, clamping"
            );
        }

        Self {
            store: TaskStore::new(pool),
            settings,
            target,
            clock,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn is_delivery_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Entry point for newly observed payments. Works with delivery disabled.
    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store.clone(), self.clock.clone())
    }

    /// Spawn the loader and the workers.
    ///
    /// Returns `Ok(None)` when delivery is disabled: payments are still recorded
    /// as PENDING but nothing is dispatched.
    pub fn start(&self) -> Result<Option<EngineHandles>, AppError> {
        let Some(target) = self.target.clone() else {
            tracing::warn!("Notify URL or key not configured, webhook delivery disabled");
            return Ok(None);
        };

        let client = WebhookClient::new(target, self.settings.request_timeout)
            .map_err(|e| AppError::Http(e.to_string()))?;
        let max_retry = self.settings.effective_max_retry();
        let backoff = Arc::new(self.settings.backoff.clone());
        let shutdown = CancellationToken::new();
        let (tx, rx) = dispatch_queue();

        let loader = Loader::new(
            self.store.clone(),
            tx,
            self.clock.clone(),
            max_retry,
            self.settings.batch_size(),
            self.settings.loader_interval,
        )
        .with_claim_ttl(self.settings.claim_ttl);
        let loader = tokio::spawn(loader.run(shutdown.clone()));

        let workers = (0..self.settings.concurrency.max(1))
            .map(|id| {
                let worker = Worker::new(
                    id,
                    self.store.clone(),
                    rx.clone(),
                    client.clone(),
                    backoff.clone(),
                    self.clock.clone(),
                );
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            endpoint = client.endpoint(),
            workers = workers.len(),
            max_retry,
            "Notification engine started"
        );

        Ok(Some(EngineHandles {
            shutdown,
            loader,
            workers,
        }))
    }

    /// Cancel every unit and wait for all of them to finish.
    pub async fn stop(handles: EngineHandles) {
        let EngineHandles {
            shutdown,
            loader,
            workers,
        } = handles;

        shutdown.cancel();

        if let Err(e) = loader.await {
            tracing::error!(error = %e, "Task loader ended abnormally");
        }
        for (id, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!(worker = id, error = %e, "Delivery worker ended abnormally");
            }
        }

        tracing::info!("Notification engine stopped");
    }
}
