//! Cycle orchestration.
//!
//! One detection cycle: pull the latest submission snapshot, derive
//! per-deployment latest-height groups, and run each group as an
//! independent unit on a bounded worker pool. A unit is the atomic piece of
//! work (detect, read prior state, reconcile, deliver, commit, register)
//! and no unit spans two deployments, so a crash or shutdown between units
//! never leaves partial corruption.
//!
//! Per-unit errors are isolated: a store or delivery failure for one
//! deployment is logged and counted, and every other unit proceeds.

use crate::config::MonitorConfig;
use crate::detector::{
    DeploymentBlockGroup, ReconcileAction, detect, latest_height_groups, reconcile,
};
use crate::feed::SubmissionFeed;
use crate::models::{Issue, Submission};
use crate::notify::{IssueReport, Notifier};
use crate::storage::{NotificationStore, ReuseIndex};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What one cycle accomplished; logged after every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Deployment groups analyzed.
    pub deployments: usize,
    /// Discrepancy notifications accepted (first notices and reopens).
    pub discrepancies_notified: usize,
    /// Reuse notifications accepted.
    pub reuses_notified: usize,
    /// Discrepancy candidates suppressed by the idempotence filter.
    pub suppressed: usize,
    /// Deliveries that exhausted their retry budget.
    pub delivery_failures: usize,
    /// Units that failed on durable-state access and were skipped.
    pub failed_units: usize,
    /// True when the feed stayed unavailable and the cycle was a no-op.
    pub feed_unavailable: bool,
}

impl CycleSummary {
    fn absorb(&mut self, other: Self) {
        self.deployments += other.deployments;
        self.discrepancies_notified += other.discrepancies_notified;
        self.reuses_notified += other.reuses_notified;
        self.suppressed += other.suppressed;
        self.delivery_failures += other.delivery_failures;
        self.failed_units += other.failed_units;
    }
}

/// Per-deployment unit outcome, folded into the cycle summary.
#[derive(Debug, Default)]
struct UnitOutcome {
    discrepancies_notified: usize,
    reuses_notified: usize,
    suppressed: usize,
    delivery_failures: usize,
}

/// Runs detection cycles over the configured collaborators.
pub struct Monitor {
    config: MonitorConfig,
    feed: Arc<dyn SubmissionFeed>,
    notifications: Arc<dyn NotificationStore>,
    reuse_index: Arc<dyn ReuseIndex>,
    notifier: Arc<dyn Notifier>,
}

impl Monitor {
    /// Wires a monitor from its collaborators.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        feed: Arc<dyn SubmissionFeed>,
        notifications: Arc<dyn NotificationStore>,
        reuse_index: Arc<dyn ReuseIndex>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            feed,
            notifications,
            reuse_index,
            notifier,
        }
    }

    /// Runs one detection cycle.
    ///
    /// Never panics and never returns an error: every failure mode is
    /// degraded to a logged, counted skip. `shutdown` is checked between
    /// per-deployment units; setting it aborts the remainder of the cycle
    /// cleanly.
    pub fn run_cycle(&self, shutdown: &AtomicBool) -> CycleSummary {
        let started = Instant::now();
        metrics::counter!("cycle_runs_total").increment(1);

        let snapshot = match self.fetch_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Safe no-op: no state was mutated, next cycle retries.
                tracing::warn!(error = %e, "Feed unavailable for the whole cycle; skipping");
                metrics::counter!("cycle_feed_unavailable_total").increment(1);
                return CycleSummary {
                    feed_unavailable: true,
                    ..CycleSummary::default()
                };
            },
        };

        let groups = latest_height_groups(snapshot);
        let summary = self.analyze_groups(groups, shutdown);

        if self.config.retention_days > 0 {
            if let Err(e) = self.notifications.purge_stale(self.config.retention_days) {
                tracing::warn!(error = %e, "Failed to purge stale notification records");
            }
        }

        tracing::info!(
            deployments = summary.deployments,
            discrepancies = summary.discrepancies_notified,
            reuses = summary.reuses_notified,
            suppressed = summary.suppressed,
            failed_units = summary.failed_units,
            delivery_failures = summary.delivery_failures,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Detection cycle finished"
        );
        summary
    }

    /// Fetches the snapshot, retrying transient feed failures with
    /// exponential backoff inside the cycle.
    fn fetch_snapshot(&self) -> Result<Vec<Submission>> {
        let max_attempts = self.config.feed_retries + 1;
        let mut last_err = Error::FeedUnavailable("no attempts made".to_string());

        for attempt in 1..=max_attempts {
            match self.feed.latest_submissions() {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Feed fetch failed");
                    last_err = e;
                    if attempt < max_attempts {
                        std::thread::sleep(Duration::from_millis(1_000u64 << (attempt - 1)));
                    }
                },
            }
        }
        Err(last_err)
    }

    /// Fans the groups out over a bounded scoped-thread worker pool.
    ///
    /// One worker owns one deployment at a time, so no two workers ever
    /// reconcile the same `(deployment, block)` key.
    fn analyze_groups(
        &self,
        groups: Vec<DeploymentBlockGroup>,
        shutdown: &AtomicBool,
    ) -> CycleSummary {
        let mut summary = CycleSummary::default();
        if groups.is_empty() {
            return summary;
        }

        let workers = self.config.concurrency.min(groups.len()).max(1);
        let chunk_size = groups.len().div_ceil(workers);

        let partials = std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut partial = CycleSummary::default();
                        for group in chunk {
                            if shutdown.load(Ordering::Relaxed) {
                                tracing::info!("Shutdown requested; aborting between units");
                                break;
                            }
                            partial.deployments += 1;
                            match self.analyze_deployment(group) {
                                Ok(unit) => {
                                    partial.discrepancies_notified += unit.discrepancies_notified;
                                    partial.reuses_notified += unit.reuses_notified;
                                    partial.suppressed += unit.suppressed;
                                    partial.delivery_failures += unit.delivery_failures;
                                },
                                Err(e) => {
                                    tracing::error!(
                                        deployment = %group.deployment,
                                        block = group.block_number,
                                        error = %e,
                                        "Deployment unit failed; retrying next cycle"
                                    );
                                    metrics::counter!("deployment_unit_failures_total")
                                        .increment(1);
                                    partial.failed_units += 1;
                                },
                            }
                        }
                        partial
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect::<Vec<_>>()
        });

        for partial in partials {
            summary.absorb(partial);
        }
        summary
    }

    /// Analyzes one deployment group: the atomic per-cycle unit.
    ///
    /// Ordering within the unit is read-then-decide: candidates are
    /// computed from the snapshot before any reuse index registration is
    /// applied, and notification state is read before any send.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] when either durable store cannot
    /// be read consistently; the unit is skipped for this cycle and retried
    /// on the next one.
    fn analyze_deployment(&self, group: &DeploymentBlockGroup) -> Result<UnitOutcome> {
        let outcome = detect(group, self.reuse_index.as_ref())?;
        let mut unit = UnitOutcome::default();

        if let Some(discrepancy) = outcome.discrepancy {
            let candidate = discrepancy.poi_set();
            // The prior record must be readable before any send decision;
            // notifying on unknown prior state would break idempotence.
            let prior = self
                .notifications
                .last_notified(&group.deployment, group.block_number)?;

            match reconcile(prior.as_ref().map(|r| &r.poi_set), &candidate) {
                ReconcileAction::Suppress => {
                    tracing::debug!(
                        deployment = %group.deployment,
                        block = group.block_number,
                        "Discrepancy already notified; suppressing"
                    );
                    unit.suppressed += 1;
                },
                ReconcileAction::Notify(full_set) => {
                    self.deliver_discrepancy(group, discrepancy, &full_set, false, &mut unit)?;
                },
                ReconcileAction::Reopen(full_set) => {
                    self.deliver_discrepancy(group, discrepancy, &full_set, true, &mut unit)?;
                },
            }
        }

        for reuse in outcome.reuses {
            // A reuse event, once reported, is permanently closed.
            if self.notifications.reuse_reported(&reuse.poi)? {
                continue;
            }
            let report = IssueReport::new(Issue::Reuse(reuse.clone()));
            match self.notifier.send(&report) {
                Ok(_) => {
                    self.notifications.mark_reuse_reported(&reuse.poi)?;
                    tracing::info!(
                        poi = %reuse.poi,
                        deployment = %reuse.deployment,
                        block = reuse.block_number,
                        origin_deployment = %reuse.origin.deployment,
                        origin_block = reuse.origin.block_number,
                        "Reuse notification delivered"
                    );
                    metrics::counter!("issues_notified_total", "kind" => "reuse").increment(1);
                    unit.reuses_notified += 1;
                },
                Err(e) => {
                    tracing::error!(poi = %reuse.poi, error = %e, "Failed to deliver reuse notification");
                    unit.delivery_failures += 1;
                },
            }
        }

        // Registrations last: candidates above were computed from a single
        // consistent snapshot.
        for (poi, origin) in outcome.registrations {
            self.reuse_index.register_if_absent(&poi, &origin)?;
        }

        Ok(unit)
    }

    /// Sends one discrepancy report and commits the notified set on
    /// acceptance.
    fn deliver_discrepancy(
        &self,
        group: &DeploymentBlockGroup,
        discrepancy: crate::models::Discrepancy,
        full_set: &crate::models::PoiSet,
        reopened: bool,
        unit: &mut UnitOutcome,
    ) -> Result<()> {
        let report = IssueReport::new(Issue::Discrepancy(discrepancy));
        let message = report.render_text();

        match self.notifier.send(&report) {
            Ok(receipt) => {
                // Commit only after the delivery was accepted.
                self.notifications.record_notified(
                    &group.deployment,
                    group.block_number,
                    full_set,
                    &message,
                )?;
                tracing::info!(
                    deployment = %group.deployment,
                    block = group.block_number,
                    hashes = full_set.len(),
                    reopened,
                    attempts = receipt.attempts,
                    "Discrepancy notification delivered"
                );
                metrics::counter!("issues_notified_total", "kind" => "discrepancy").increment(1);
                unit.discrepancies_notified += 1;
            },
            Err(e) => {
                // State store untouched: next cycle retries.
                tracing::error!(
                    deployment = %group.deployment,
                    block = group.block_number,
                    error = %e,
                    "Failed to deliver discrepancy notification"
                );
                unit.delivery_failures += 1;
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeploymentId, IndexerId, PoiHash};
    use crate::notify::DeliveryReceipt;
    use crate::storage::SqliteStateStore;
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    /// Feed returning pre-scripted batches, optionally failing first.
    struct ScriptedFeed {
        batches: Mutex<VecDeque<Vec<Submission>>>,
        failures_before_success: AtomicU32,
    }

    impl ScriptedFeed {
        fn new(batches: Vec<Vec<Submission>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                failures_before_success: AtomicU32::new(0),
            }
        }

        fn failing(times: u32) -> Self {
            let feed = Self::new(vec![]);
            feed.failures_before_success.store(times, Ordering::SeqCst);
            feed
        }
    }

    impl SubmissionFeed for ScriptedFeed {
        fn latest_submissions(&self) -> Result<Vec<Submission>> {
            let remaining = self.failures_before_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_before_success
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(Error::FeedUnavailable("scripted outage".to_string()));
            }
            Ok(self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    /// Notifier recording accepted reports, optionally rejecting everything.
    struct RecordingNotifier {
        sent: Mutex<Vec<IssueReport>>,
        failures_before_success: AtomicU32,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures_before_success: AtomicU32::new(0),
            }
        }

        fn failing(times: u32) -> Self {
            let notifier = Self::new();
            notifier.failures_before_success.store(times, Ordering::SeqCst);
            notifier
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, report: &IssueReport) -> Result<DeliveryReceipt> {
            let remaining = self.failures_before_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_before_success
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(Error::DeliveryFailed {
                    attempts: 1,
                    cause: "scripted rejection".to_string(),
                });
            }
            self.sent.lock().unwrap().push(report.clone());
            Ok(DeliveryReceipt {
                status_code: Some(200),
                attempts: 1,
                duration_ms: 1,
            })
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            feed_endpoint: "http://localhost:8000/graphql".to_string(),
            webhook_url: SecretString::from("https://hooks.slack.com/services/T/B/X"),
            database_path: PathBuf::from(":memory:"),
            poll_interval: Duration::from_secs(300),
            concurrency: 2,
            http_timeout: Duration::from_secs(10),
            feed_retries: 0,
            delivery_retries: 0,
            retention_days: 0,
        }
    }

    fn hash(n: u8) -> PoiHash {
        PoiHash::parse(&format!("0x{}", hex::encode([n; 32]))).unwrap()
    }

    fn submission(deployment: &str, block: u64, poi: u8, indexer: &str) -> Submission {
        Submission {
            deployment: DeploymentId::from(deployment),
            block_number: block,
            poi: hash(poi),
            indexer: IndexerId::from(indexer),
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn monitor_with(
        batches: Vec<Vec<Submission>>,
        notifier: Arc<RecordingNotifier>,
    ) -> (Monitor, Arc<SqliteStateStore>) {
        let store = Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let monitor = Monitor::new(
            config(),
            Arc::new(ScriptedFeed::new(batches)),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&store) as Arc<dyn ReuseIndex>,
            notifier,
        );
        (monitor, store)
    }

    fn no_shutdown() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_worked_example_scenario() {
        // Cycle 1: A and B agree on H1 at (D1, 100): no discrepancy.
        // Cycle 2: C submits H2 at the same key: Notify {H1, H2}.
        // Cycle 3: same submissions: Suppress.
        // Cycle 4: D2 at block 5000 includes H1: Reuse vs origin (D1, 100).
        let agree = vec![
            submission("D1", 100, 1, "0xaa"),
            submission("D1", 100, 1, "0xbb"),
        ];
        let mut disputed = agree.clone();
        disputed.push(submission("D1", 100, 2, "0xcc"));
        let reused = vec![submission("D2", 5_000, 1, "0xdd")];

        let notifier = Arc::new(RecordingNotifier::new());
        let (monitor, _store) = monitor_with(
            vec![agree, disputed.clone(), disputed, reused],
            Arc::clone(&notifier),
        );
        let shutdown = no_shutdown();

        let s1 = monitor.run_cycle(&shutdown);
        assert_eq!(s1.discrepancies_notified, 0);
        assert_eq!(notifier.sent_count(), 0);

        let s2 = monitor.run_cycle(&shutdown);
        assert_eq!(s2.discrepancies_notified, 1);
        assert_eq!(notifier.sent_count(), 1);

        let s3 = monitor.run_cycle(&shutdown);
        assert_eq!(s3.discrepancies_notified, 0);
        assert_eq!(s3.suppressed, 1);
        assert_eq!(notifier.sent_count(), 1);

        let s4 = monitor.run_cycle(&shutdown);
        assert_eq!(s4.reuses_notified, 1);
        assert_eq!(notifier.sent_count(), 2);
        let sent = notifier.sent.lock().unwrap();
        let Issue::Reuse(reuse) = &sent[1].issue else {
            panic!("expected a reuse report");
        };
        assert_eq!(reuse.origin.deployment, DeploymentId::from("D1"));
        assert_eq!(reuse.origin.block_number, 100);
    }

    #[test]
    fn test_growth_reopens_exactly_once() {
        let two = vec![
            submission("D1", 100, 1, "0xaa"),
            submission("D1", 100, 2, "0xbb"),
        ];
        let mut three = two.clone();
        three.push(submission("D1", 100, 3, "0xcc"));

        let notifier = Arc::new(RecordingNotifier::new());
        let (monitor, _store) =
            monitor_with(vec![two, three.clone(), three], Arc::clone(&notifier));
        let shutdown = no_shutdown();

        assert_eq!(monitor.run_cycle(&shutdown).discrepancies_notified, 1);
        assert_eq!(monitor.run_cycle(&shutdown).discrepancies_notified, 1); // reopen
        let s3 = monitor.run_cycle(&shutdown);
        assert_eq!(s3.discrepancies_notified, 0);
        assert_eq!(s3.suppressed, 1);
        assert_eq!(notifier.sent_count(), 2);
    }

    #[test]
    fn test_delivery_failure_leaves_state_untouched_and_retries() {
        let disputed = vec![
            submission("D1", 100, 1, "0xaa"),
            submission("D1", 100, 2, "0xbb"),
        ];

        let notifier = Arc::new(RecordingNotifier::failing(1));
        let (monitor, store) =
            monitor_with(vec![disputed.clone(), disputed], Arc::clone(&notifier));
        let shutdown = no_shutdown();

        let s1 = monitor.run_cycle(&shutdown);
        assert_eq!(s1.delivery_failures, 1);
        assert_eq!(s1.discrepancies_notified, 0);
        // Not committed: no record exists for the key.
        assert!(
            store
                .last_notified(&DeploymentId::from("D1"), 100)
                .unwrap()
                .is_none()
        );

        // Next cycle recomputes the same candidate and delivers it.
        let s2 = monitor.run_cycle(&shutdown);
        assert_eq!(s2.discrepancies_notified, 1);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[test]
    fn test_reuse_reported_once_forever() {
        let seed = vec![submission("D1", 100, 1, "0xaa")];
        let reused = vec![submission("D2", 5_000, 1, "0xdd")];

        let notifier = Arc::new(RecordingNotifier::new());
        let (monitor, _store) = monitor_with(
            vec![seed, reused.clone(), reused],
            Arc::clone(&notifier),
        );
        let shutdown = no_shutdown();

        monitor.run_cycle(&shutdown);
        assert_eq!(monitor.run_cycle(&shutdown).reuses_notified, 1);
        assert_eq!(monitor.run_cycle(&shutdown).reuses_notified, 0);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[test]
    fn test_feed_outage_is_safe_noop() {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let monitor = Monitor::new(
            config(),
            Arc::new(ScriptedFeed::failing(5)),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&store) as Arc<dyn ReuseIndex>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );

        let summary = monitor.run_cycle(&no_shutdown());
        assert!(summary.feed_unavailable);
        assert_eq!(summary.deployments, 0);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[test]
    fn test_shutdown_aborts_between_units() {
        let batch = vec![
            submission("D1", 100, 1, "0xaa"),
            submission("D2", 200, 2, "0xbb"),
            submission("D3", 300, 3, "0xcc"),
        ];
        let notifier = Arc::new(RecordingNotifier::new());
        let (monitor, _store) = monitor_with(vec![batch], Arc::clone(&notifier));

        let shutdown = AtomicBool::new(true);
        let summary = monitor.run_cycle(&shutdown);
        // Every worker saw the flag before starting its first unit.
        assert_eq!(summary.deployments, 0);
    }
}
