//! # POI Sentinel
//!
//! Continuous auditing of Proof-of-Indexing (POI) submissions across a
//! decentralized indexing network.
//!
//! POI Sentinel pulls the latest POI submissions per subgraph deployment,
//! detects two classes of anomaly, and delivers exactly one notification per
//! distinct issue state:
//!
//! - **Discrepancy**: indexers disagree on the POI for the same deployment
//!   at the same block height.
//! - **Reuse**: an identical POI hash appears for a structurally different
//!   deployment/block pair, which should be cryptographically improbable.
//!
//! Notification dedup is driven entirely by durable state (SQLite), so the
//! filter behaves identically whether the process has been running
//! continuously or was just restarted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use poi_sentinel::{Monitor, MonitorConfig, SqliteStateStore};
//!
//! let store = Arc::new(SqliteStateStore::open(&config.database_path)?);
//! let monitor = Monitor::new(config, feed, store.clone(), store, notifier);
//! let summary = monitor.run_cycle(&shutdown);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod detector;
pub mod feed;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod storage;

// Re-exports for convenience
pub use config::MonitorConfig;
pub use detector::{
    DeploymentBlockGroup, DetectionOutcome, ReconcileAction, detect, latest_height_groups,
    reconcile,
};
pub use feed::{GraphqlFeed, SubmissionFeed};
pub use models::{
    DeploymentId, Discrepancy, IndexerId, Issue, PoiHash, PoiSet, Reuse, ReuseIndexEntry,
    Submission,
};
pub use monitor::{CycleSummary, Monitor};
pub use notify::{IssueReport, Notifier, SlackNotifier};
pub use scheduler::CycleDriver;
pub use storage::{NotificationRecord, NotificationStore, ReuseIndex, SqliteStateStore};

/// Error type for POI sentinel operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `FeedUnavailable` | GraphQL feed endpoint unreachable, non-2xx response, malformed envelope |
/// | `MalformedSubmission` | Missing POI hash, invalid hash encoding, empty identifiers |
/// | `StoreUnavailable` | SQLite open/read/write failures for either durable store |
/// | `DeliveryFailed` | Notification delivery exhausted its retry budget |
/// | `InvalidConfig` | Non-positive polling interval, zero concurrency, missing endpoints |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The submission feed could not be queried.
    ///
    /// Transient: retried with backoff within the cycle. If still failing at
    /// cycle end the cycle is a safe no-op (no state mutation).
    #[error("submission feed unavailable: {0}")]
    FeedUnavailable(String),

    /// A single submission record failed validation.
    ///
    /// The offending submission is dropped and logged; it never aborts the
    /// deployment's analysis.
    #[error("malformed submission: {reason}")]
    MalformedSubmission {
        /// Why the submission was rejected.
        reason: String,
    },

    /// A durable store could not be read or written.
    ///
    /// Fatal to that deployment's unit for the current cycle: the engine
    /// must never notify without a consistent read of prior state.
    #[error("state store '{store}' unavailable: {cause}")]
    StoreUnavailable {
        /// Which store failed ("notifications" or "reuse_index").
        store: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// Notification delivery failed after all retries.
    ///
    /// The notification state store is NOT updated on this error, so the
    /// next cycle retries the same notification.
    #[error("delivery failed after {attempts} attempts: {cause}")]
    DeliveryFailed {
        /// Attempts made, including the first.
        attempts: u32,
        /// The underlying cause.
        cause: String,
    },

    /// Configuration was rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for POI sentinel operations.
pub type Result<T> = std::result::Result<T, Error>;
