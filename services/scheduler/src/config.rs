use std::time::Duration;

use anyhow::{Context as _, anyhow};

use crate::domain::policy::{Backoff, RetryPolicy};
use crate::domain::types::{DEFAULT_MAX_RETRIES, MAX_ALLOWED_RETRIES};
use crate::usecase::dispatch::{DispatchSettings, MAX_BATCH_LIMIT, MAX_CONCURRENCY};

/// Scheduler service configuration loaded from environment variables.
#[derive(Debug)]
pub struct SchedulerConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Automation webhook that publishes posts. Env var: `WEBHOOK_URL`.
    pub webhook_url: String,
    /// Shared secret expected from the cron trigger. Env var: `CRON_SECRET`.
    pub cron_secret: String,
    /// TCP port to listen on (default 3120). Env var: `SCHEDULER_PORT`.
    pub port: u16,
    pub batch_limit: u64,
    pub concurrency: usize,
    pub webhook_timeout_secs: u64,
    pub retry_backoff: Backoff,
    pub retry_base_delay_secs: i64,
    pub retry_max_delay_secs: i64,
    pub default_max_retries: u32,
}

impl SchedulerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} is not set"));

        let config = Self {
            database_url: required("DATABASE_URL")?,
            webhook_url: required("WEBHOOK_URL")?,
            cron_secret: required("CRON_SECRET")?,
            port: parse_or(get("SCHEDULER_PORT"), "SCHEDULER_PORT", 3120)?,
            batch_limit: parse_or::<u64>(get("DISPATCH_BATCH_LIMIT"), "DISPATCH_BATCH_LIMIT", 10)?
                .clamp(1, MAX_BATCH_LIMIT),
            concurrency: parse_or::<usize>(get("DISPATCH_CONCURRENCY"), "DISPATCH_CONCURRENCY", 5)?
                .clamp(1, MAX_CONCURRENCY),
            webhook_timeout_secs: parse_or::<u64>(get("WEBHOOK_TIMEOUT_SECS"), "WEBHOOK_TIMEOUT_SECS", 15)?
                .max(1),
            retry_backoff: match get("RETRY_BACKOFF") {
                Some(v) => v.parse::<Backoff>().map_err(|e| anyhow!("RETRY_BACKOFF: {e}"))?,
                None => Backoff::default(),
            },
            retry_base_delay_secs: parse_or::<i64>(
                get("RETRY_BASE_DELAY_SECS"),
                "RETRY_BASE_DELAY_SECS",
                300,
            )?
            .max(1),
            retry_max_delay_secs: parse_or::<i64>(
                get("RETRY_MAX_DELAY_SECS"),
                "RETRY_MAX_DELAY_SECS",
                3600,
            )?
            .max(1),
            default_max_retries: parse_or(
                get("DEFAULT_MAX_RETRIES"),
                "DEFAULT_MAX_RETRIES",
                DEFAULT_MAX_RETRIES,
            )?,
        };

        if config.default_max_retries > MAX_ALLOWED_RETRIES {
            return Err(anyhow!(
                "DEFAULT_MAX_RETRIES must be at most {MAX_ALLOWED_RETRIES}"
            ));
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: self.retry_backoff,
            base_delay: chrono::Duration::seconds(self.retry_base_delay_secs),
            max_delay: chrono::Duration::seconds(self.retry_max_delay_secs),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_limit: self.batch_limit,
            concurrency: self.concurrency,
            webhook_timeout: Duration::from_secs(self.webhook_timeout_secs),
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.trim().parse().with_context(|| format!("{key}: invalid value {v:?}")),
        None => Ok(default),
    }
}
