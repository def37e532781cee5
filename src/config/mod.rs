//! Typed configuration from environment variables.
//!
//! Loads once at startup (and again on SIGHUP), fails fast if required vars
//! are missing or malformed. The database URL is wrapped in
//! secrecy::SecretString so it never ends up in logs.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::DispatcherConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;

/// Default size of the database pool, which is also the concurrency cap.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Upper bound for every configured interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Postgres pool size. Work items never run more concurrently than this.
    pub pool_size: usize,
    pub heartbeat_interval: Duration,
    /// Per-item deadline for notification work. `None` disables timeouts.
    pub item_timeout: Option<Duration>,
    pub fatal_backoff: Duration,
    pub check_interval: Duration,
    pub tick_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let item_timeout_ms: u64 = optional_var("TGPG_ITEM_TIMEOUT_MS", 15_000)?;

        let pool_size: usize = optional_var("TGPG_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(Error::Config("TGPG_POOL_SIZE must be at least 1".to_string()));
        }

        let tick_interval = interval(
            "TGPG_TICK_MS",
            Duration::from_millis(optional_var("TGPG_TICK_MS", 1_000)?),
        )?;
        if tick_interval.is_zero() {
            return Err(Error::Config("TGPG_TICK_MS must be at least 1".to_string()));
        }

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            pool_size,
            heartbeat_interval: interval(
                "TGPG_HEARTBEAT_MS",
                Duration::from_millis(optional_var("TGPG_HEARTBEAT_MS", 5_000)?),
            )?,
            item_timeout: (item_timeout_ms > 0)
                .then(|| interval("TGPG_ITEM_TIMEOUT_MS", Duration::from_millis(item_timeout_ms)))
                .transpose()?,
            fatal_backoff: interval(
                "TGPG_BACKOFF_SECS",
                Duration::from_secs(optional_var("TGPG_BACKOFF_SECS", 10)?),
            )?,
            check_interval: interval(
                "TGPG_CHECK_SECS",
                Duration::from_secs(optional_var("TGPG_CHECK_SECS", 60)?),
            )?,
            tick_interval,
        })
    }

    /// Dispatcher settings derived from this configuration.
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_queue: self.pool_size,
            heartbeat_interval: self.heartbeat_interval,
            item_timeout: self.item_timeout,
            fatal_backoff: self.fatal_backoff,
            check_interval: self.check_interval,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn interval(name: &str, value: Duration) -> Result<Duration> {
    if value > MAX_INTERVAL {
        return Err(Error::Config(format!(
            "{name} exceeds the maximum of {} seconds",
            MAX_INTERVAL.as_secs()
        )));
    }
    Ok(value)
}

fn optional_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}"))),
        Err(_) => Ok(default),
    }
}
