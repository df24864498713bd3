//! Shared application state for the Axum API server.

use paynotify_common::config::AppConfig;
use paynotify_engine::ingest::Ingestor;
use sqlx::SqlitePool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub ingestor: Ingestor,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, ingestor: Ingestor) -> Self {
        Self {
            pool,
            config,
            ingestor,
        }
    }
}
