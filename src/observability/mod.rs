//! Structured logging and metrics bootstrap.

use crate::{Error, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// Machine-readable JSON lines.
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Initializes the global tracing subscriber.
///
/// Respects `RUST_LOG` when set; otherwise defaults to `info`, or `debug`
/// with `verbose`. Safe to call more than once; only the first call takes
/// effect.
pub fn init_logging(format: LogFormat, verbose: bool) {
    LOGGING_INIT.get_or_init(|| {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Tracing subscriber was already installed");
        }
    });
}

/// Installs a Prometheus metrics exporter listening on `addr`.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the listener cannot be installed
/// (address in use, invalid, or an exporter is already registered).
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::InvalidConfig(format!("metrics listener on {addr}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Compact, false);
        init_logging(LogFormat::Json, true);
    }
}
