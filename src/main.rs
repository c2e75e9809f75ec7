//! Binary entry point for poi-sentinel.
//!
//! Wires the feed, stores, notifier and scheduler from CLI/environment
//! configuration and runs detection cycles until interrupted.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for startup failures before logging exists
#![allow(clippy::print_stderr)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::Parser;
use poi_sentinel::cli::Cli;
use poi_sentinel::notify::RetryPolicy;
use poi_sentinel::storage::{NotificationStore, ReuseIndex};
use poi_sentinel::{
    CycleDriver, GraphqlFeed, Monitor, MonitorConfig, SlackNotifier, SqliteStateStore,
    observability,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> ExitCode {
    // Environment files are optional; absence is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("poi-sentinel: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, options) = cli.into_settings()?;

    observability::init_logging(options.log_format, options.verbose);
    if let Some(addr) = options.metrics_listen {
        observability::init_metrics(addr).context("failed to start metrics listener")?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_path.display(),
        interval_secs = config.poll_interval.as_secs(),
        concurrency = config.concurrency,
        "Starting POI sentinel"
    );

    let (monitor, shutdown) = build_monitor(&config).context("failed to initialize components")?;

    if options.once {
        let summary = monitor.run_cycle(&shutdown);
        tracing::info!(?summary, "Single cycle complete");
        return Ok(());
    }

    CycleDriver::new(monitor, config.poll_interval, shutdown).run();
    Ok(())
}

/// Wires the monitor and installs the Ctrl-C handler.
fn build_monitor(config: &MonitorConfig) -> anyhow::Result<(Monitor, Arc<AtomicBool>)> {
    let store = Arc::new(
        SqliteStateStore::open(&config.database_path).context("failed to open state database")?,
    );
    let feed = Arc::new(GraphqlFeed::new(
        config.feed_endpoint.clone(),
        config.http_timeout,
    ));
    let notifier = Arc::new(
        SlackNotifier::new(config.webhook_url.clone(), config.http_timeout).with_retry(
            RetryPolicy {
                max_retries: config.delivery_retries,
                ..RetryPolicy::default()
            },
        ),
    );

    let monitor = Monitor::new(
        config.clone(),
        feed,
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        store as Arc<dyn ReuseIndex>,
        notifier,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received; shutting down after the current unit");
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install interrupt handler")?;

    Ok((monitor, shutdown))
}
