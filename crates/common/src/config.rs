use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SQLite connection string (created if missing)
    pub database_url: String,

    /// Maximum number of SQLite connections in the pool (default: 5)
    pub db_max_connections: u32,

    /// Webhook endpoint payments are delivered to
    pub notify_url: Option<String>,

    /// Shared secret appended to the signed fields
    pub notify_key: Option<String>,

    /// Delivery attempts allowed per payment (default: 7)
    pub notify_max_retry: u32,

    /// Number of concurrent delivery workers (default: 10)
    pub notify_concurrency: usize,

    /// Seconds between two loader scans (default: 1)
    pub notify_loader_interval_secs: u64,

    /// Webhook request timeout in seconds (default: 10)
    pub notify_timeout_secs: u64,

    /// Claim lease length in seconds. `None` keeps plain at-least-once dispatch.
    pub notify_claim_ttl_secs: Option<u64>,

    /// Query API bind host
    pub api_host: String,

    /// Query API bind port
    pub api_port: u16,
}

/// Where and how webhooks are delivered. Only exists when both URL and secret are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub url: String,
    pub secret: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://payments.db".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            notify_url: std::env::var("NOTIFY_URL").ok(),
            notify_key: std::env::var("NOTIFY_KEY").ok(),
            notify_max_retry: std::env::var("NOTIFY_MAX_RETRY")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_MAX_RETRY must be a valid u32"))?,
            notify_concurrency: std::env::var("NOTIFY_CONCURRENCY")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_CONCURRENCY must be a valid usize"))?,
            notify_loader_interval_secs: std::env::var("NOTIFY_LOADER_INTERVAL_SECS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_LOADER_INTERVAL_SECS must be a valid u64"))?,
            notify_timeout_secs: std::env::var("NOTIFY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_TIMEOUT_SECS must be a valid u64"))?,
            notify_claim_ttl_secs: match std::env::var("NOTIFY_CLAIM_TTL_SECS") {
                Ok(raw) => {
                    let secs: u64 = raw.parse().map_err(|_| {
                        anyhow::anyhow!("NOTIFY_CLAIM_TTL_SECS must be a valid u64")
                    })?;
                    (secs > 0).then_some(secs)
                }
                Err(_) => None,
            },
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        })
    }

    /// Webhook target, or `None` when delivery is disabled (URL or secret missing/blank).
    pub fn delivery(&self) -> Option<DeliveryTarget> {
        let url = self.notify_url.as_deref().map(str::trim).unwrap_or_default();
        let secret = self.notify_key.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() || secret.is_empty() {
            return None;
        }
        Some(DeliveryTarget {
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }

    pub fn loader_interval(&self) -> Duration {
        Duration::from_secs(self.notify_loader_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn claim_ttl(&self) -> Option<Duration> {
        self.notify_claim_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://payments.db".to_string(),
            db_max_connections: 5,
            notify_url: None,
            notify_key: None,
            notify_max_retry: 7,
            notify_concurrency: 10,
            notify_loader_interval_secs: 1,
            notify_timeout_secs: 10,
            notify_claim_ttl_secs: None,
            api_host: "0.0.0.0".to_string(),
            api_port: 5000,
        }
    }
}
