use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::crawl_jobs::{LifecycleConfig, PollerConfig, StalenessConfig};
use crate::kernel::{WorkerClientConfig, DEFAULT_WORKER_BASE_URL};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub worker_base_url: String,
    pub worker_api_key: String,
    pub worker_timeout: Duration,
    pub cron_secret: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub poll_interval: Duration,
    pub abandon_after: Duration,
    pub probe_delay: Duration,
    pub probe_timeout: Duration,
    pub staleness_budget: Duration,
    pub staleness_cron: Option<String>,
    pub server_reconciler: bool,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or("PORT", 8080)?,
            worker_base_url: env::var("WORKER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_WORKER_BASE_URL.to_string()),
            worker_api_key: env::var("WORKER_API_KEY").context("WORKER_API_KEY must be set")?,
            worker_timeout: Duration::from_secs(parse_or("WORKER_TIMEOUT_SECS", 30)?),
            cron_secret: env::var("CRON_SECRET").context("CRON_SECRET must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "crawl-tracker".to_string()),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 5)?),
            abandon_after: Duration::from_secs(parse_or("ABANDON_AFTER_SECS", 120)?),
            probe_delay: Duration::from_millis(parse_or("PROBE_DELAY_MS", 200)?),
            probe_timeout: Duration::from_secs(parse_or("PROBE_TIMEOUT_SECS", 15)?),
            staleness_budget: Duration::from_secs(parse_or("STALENESS_BUDGET_SECS", 60)?),
            staleness_cron: env::var("STALENESS_CRON")
                .ok()
                .filter(|expr| !expr.trim().is_empty()),
            server_reconciler: parse_or("SERVER_RECONCILER", true)?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or_default(),
        })
    }

    pub fn worker_client_config(&self) -> WorkerClientConfig {
        WorkerClientConfig::new(self.worker_base_url.clone(), self.worker_api_key.clone())
            .with_timeout(self.worker_timeout)
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            abandon_after: chrono::Duration::from_std(self.abandon_after)
                .unwrap_or_else(|_| LifecycleConfig::default().abandon_after),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
        }
    }

    pub fn staleness_config(&self) -> StalenessConfig {
        StalenessConfig {
            probe_delay: self.probe_delay,
            probe_timeout: self.probe_timeout,
            budget: self.staleness_budget,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid {}", key, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

/// Comma separated origins; `*` or an empty list means any origin.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example ,"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn wildcard_origin_means_any() {
        assert!(parse_origins("*").is_empty());
    }
}
