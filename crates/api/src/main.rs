//! paynotify server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use paynotify_common::config::AppConfig;
use paynotify_common::db::{create_pool, migrate};
use paynotify_engine::NotificationEngine;

use paynotify_api::routes::create_router;
use paynotify_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "paynotify_api=info,paynotify_engine=info,paynotify_notifier=info,tower_http=info",
            )
        }))
        .init();

    tracing::info!("Starting paynotify...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    migrate(&pool).await?;
    tracing::info!(database = %config.database_url, "Database ready");

    // Start the delivery engine (no-op when no webhook target is configured)
    let engine = NotificationEngine::from_config(pool.clone(), &config);
    let handles = engine.start()?;

    let addr: SocketAddr = format!("{}:{}", config.api_host, config.api_port).parse()?;
    let state = AppState::new(pool, config, engine.ingestor());
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handles) = handles {
        NotificationEngine::stop(handles).await;
    }
    tracing::info!("paynotify stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
