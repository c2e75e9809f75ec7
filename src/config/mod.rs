//! Configuration management.

use crate::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the monitor.
///
/// All values arrive from the CLI/environment; there is no internal
/// defaulting logic here beyond validation.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// GraphQL feed endpoint.
    pub feed_endpoint: String,
    /// Slack incoming webhook URL (credential; never logged).
    pub webhook_url: SecretString,
    /// Path to the SQLite state database.
    pub database_path: PathBuf,
    /// Delay between detection cycles.
    ///
    /// Each cycle analyzes only the latest observed block height per
    /// deployment, so this interval also bounds detection staleness: an
    /// issue at a height that is superseded before the next cycle runs is
    /// never analyzed. Shorten the interval to narrow that window; the
    /// trade-off is feed and database load, not correctness.
    pub poll_interval: Duration,
    /// Bounded worker pool size for per-deployment analysis.
    pub concurrency: usize,
    /// Request timeout for feed and webhook calls.
    pub http_timeout: Duration,
    /// Feed fetch retries within one cycle (after the first attempt).
    pub feed_retries: u32,
    /// Delivery retries per notification (after the first attempt).
    pub delivery_retries: u32,
    /// Purge discrepancy notification records older than this many days at
    /// the end of each cycle. `0` disables purging. Never applies to the
    /// reuse index.
    pub retention_days: u32,
}

impl MonitorConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the interval is not positive,
    /// the concurrency bound is zero, or an endpoint is empty.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.feed_endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "feed endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
