use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Level-trigger sweep (`stage_duration`, `condition_met`).
    pub rule_sweep_interval: Duration,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
    /// `time_scheduled` evaluation.
    pub schedule_tick_interval: Duration,
    pub alert_scan_interval: Duration,
    pub stuck_threshold_days: i64,
    pub max_cascade_depth: i16,
    pub email_poll_interval: Duration,
    pub email_max_attempts: i32,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                       | Default  |
    /// |-------------------------------|----------|
    /// | `DATABASE_URL`                | required |
    /// | `DATABASE_MAX_CONNECTIONS`    | `10`     |
    /// | `RULE_SWEEP_INTERVAL_SECS`    | `300`    |
    /// | `OUTBOX_POLL_INTERVAL_SECS`   | `5`      |
    /// | `OUTBOX_BATCH_SIZE`           | `100`    |
    /// | `SCHEDULE_TICK_INTERVAL_SECS` | `60`     |
    /// | `ALERT_SCAN_INTERVAL_SECS`    | `3600`   |
    /// | `STUCK_THRESHOLD_DAYS`        | `7`      |
    /// | `MAX_CASCADE_DEPTH`           | `5`      |
    /// | `EMAIL_POLL_INTERVAL_SECS`    | `60`     |
    /// | `EMAIL_MAX_ATTEMPTS`          | `3`      |
    ///
    /// SMTP settings are read separately by
    /// [`EmailConfig::from_env`](stageflow_events::EmailConfig::from_env).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let config = Self {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            rule_sweep_interval: secs_or(&lookup, "RULE_SWEEP_INTERVAL_SECS", 300)?,
            outbox_poll_interval: secs_or(&lookup, "OUTBOX_POLL_INTERVAL_SECS", 5)?,
            outbox_batch_size: parse_or(&lookup, "OUTBOX_BATCH_SIZE", 100)?,
            schedule_tick_interval: secs_or(&lookup, "SCHEDULE_TICK_INTERVAL_SECS", 60)?,
            alert_scan_interval: secs_or(&lookup, "ALERT_SCAN_INTERVAL_SECS", 3600)?,
            stuck_threshold_days: parse_or(&lookup, "STUCK_THRESHOLD_DAYS", 7)?,
            max_cascade_depth: parse_or(&lookup, "MAX_CASCADE_DEPTH", 5)?,
            email_poll_interval: secs_or(&lookup, "EMAIL_POLL_INTERVAL_SECS", 60)?,
            email_max_attempts: parse_or(&lookup, "EMAIL_MAX_ATTEMPTS", 3)?,
        };

        if config.outbox_batch_size < 1 {
            bail!("OUTBOX_BATCH_SIZE must be at least 1");
        }
        if config.stuck_threshold_days < 1 {
            bail!("STUCK_THRESHOLD_DAYS must be at least 1");
        }
        if config.max_cascade_depth < 0 {
            bail!("MAX_CASCADE_DEPTH must not be negative");
        }
        if config.email_max_attempts < 1 {
            bail!("EMAIL_MAX_ATTEMPTS must be at least 1");
        }
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

/// Intervals must be positive; `tokio::time::interval` panics on zero.
fn secs_or<F>(lookup: &F, key: &str, default: u64) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default)?;
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
