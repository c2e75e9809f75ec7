//! Fixed-interval cycle driver.
//!
//! A single logical loop: run one detection cycle, then sleep until the
//! next tick. Runs are non-overlapping by construction; when a cycle
//! overruns its interval the missed ticks are skipped and logged, never
//! queued, so backlog cannot compound.
//!
//! There is no startup recovery step: every piece of filter state is
//! durable, so a crash mid-cycle simply resumes at the next scheduled tick.

use crate::monitor::Monitor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the sleep loop re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Sleeps in short slices until `deadline`, returning early when the
/// shutdown flag is set.
fn sleep_until(shutdown: &AtomicBool, deadline: Instant) {
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

/// Drives detection cycles on a fixed interval until shutdown.
pub struct CycleDriver {
    monitor: Monitor,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl CycleDriver {
    /// Creates a driver over `monitor`, ticking every `interval`.
    #[must_use]
    pub fn new(monitor: Monitor, interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            monitor,
            interval,
            shutdown,
        }
    }

    /// Runs cycles until the shutdown flag is set.
    ///
    /// The flag is honored at three points: before each cycle, between a
    /// cycle's per-deployment units (inside the monitor), and during the
    /// inter-cycle sleep.
    pub fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Cycle driver started");
        let mut next_tick = Instant::now();

        while !self.shutdown.load(Ordering::Relaxed) {
            self.monitor.run_cycle(&self.shutdown);

            next_tick += self.interval;
            let now = Instant::now();
            if next_tick <= now {
                // The cycle overran the interval. Skip to the next future
                // tick rather than queueing make-up runs.
                let mut skipped = 0u64;
                while next_tick <= now {
                    next_tick += self.interval;
                    skipped += 1;
                }
                tracing::warn!(skipped, "Cycle overran its interval; skipping missed ticks");
                metrics::counter!("cycle_ticks_skipped_total").increment(skipped);
            }

            sleep_until(&self.shutdown, next_tick);
        }

        tracing::info!("Shutdown signal received; cycle driver stopped");
    }
}
