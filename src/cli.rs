//! Command line interface.

use crate::config::MonitorConfig;
use crate::observability::LogFormat;
use crate::{Error, Result};
use clap::Parser;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Proof-of-Indexing discrepancy and reuse monitor.
#[derive(Debug, Parser)]
#[command(name = "poi-sentinel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// GraphQL feed endpoint.
    #[arg(long, env = "GRAPHIX_API_URL")]
    pub feed_url: String,

    /// Slack incoming webhook URL.
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: String,

    /// Path to the SQLite state database.
    #[arg(long, env = "POI_SENTINEL_DB", default_value = "poi-sentinel.db")]
    pub database: PathBuf,

    /// Seconds between detection cycles.
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 300)]
    pub interval_secs: u64,

    /// Worker pool size for per-deployment analysis.
    #[arg(long, env = "POI_SENTINEL_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// HTTP timeout in seconds for feed and webhook requests.
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Feed fetch retries within one cycle.
    #[arg(long, default_value_t = 3)]
    pub feed_retries: u32,

    /// Delivery retries per notification.
    #[arg(long, default_value_t = 3)]
    pub delivery_retries: u32,

    /// Days to keep discrepancy notification records (0 disables purging).
    #[arg(long, env = "POI_SENTINEL_RETENTION_DAYS", default_value_t = 60)]
    pub retention_days: u32,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090).
    #[arg(long, env = "POI_SENTINEL_METRICS_ADDR")]
    pub metrics_listen: Option<SocketAddr>,

    /// Log output format: compact or json.
    #[arg(long, default_value = "compact")]
    pub log_format: String,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Run a single detection cycle and exit.
    #[arg(long)]
    pub once: bool,
}

/// Runtime options that are not part of the monitor's own configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Log output format.
    pub log_format: LogFormat,
    /// Whether verbose logging was requested.
    pub verbose: bool,
    /// Optional Prometheus listen address.
    pub metrics_listen: Option<SocketAddr>,
    /// Single-cycle mode.
    pub once: bool,
}

impl Cli {
    /// Splits the parsed arguments into validated monitor configuration and
    /// runtime options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a non-positive interval, zero
    /// concurrency, empty endpoints, or an unknown log format.
    pub fn into_settings(self) -> Result<(MonitorConfig, RunOptions)> {
        let log_format: LogFormat = self
            .log_format
            .parse()
            .map_err(|()| Error::InvalidConfig(format!("unknown log format '{}'", self.log_format)))?;

        let config = MonitorConfig {
            feed_endpoint: self.feed_url,
            webhook_url: SecretString::from(self.webhook_url),
            database_path: self.database,
            poll_interval: Duration::from_secs(self.interval_secs),
            concurrency: self.concurrency,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            feed_retries: self.feed_retries,
            delivery_retries: self.delivery_retries,
            retention_days: self.retention_days,
        };
        config.validate()?;

        let options = RunOptions {
            log_format,
            verbose: self.verbose,
            metrics_listen: self.metrics_listen,
            once: self.once,
        };
        Ok((config, options))
    }
}
