//! Storage trait seams for the durable stores.

use crate::models::{DeploymentId, PoiHash, PoiSet, ReuseIndexEntry};
use crate::Result;
use chrono::{DateTime, Utc};

/// The last issue state successfully communicated for a deployment/block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// The deployment the record belongs to.
    pub deployment: DeploymentId,
    /// The block height the record belongs to.
    pub block_number: u64,
    /// POI hashes included in the last accepted notification.
    pub poi_set: PoiSet,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Trait for the notification state store.
///
/// Drives the idempotence filter: records are read before every reconcile
/// and written only after an accepted delivery, so the filter behaves
/// identically across process restarts.
pub trait NotificationStore: Send + Sync {
    /// Loads the prior record for a key, if any.
    fn last_notified(
        &self,
        deployment: &DeploymentId,
        block_number: u64,
    ) -> Result<Option<NotificationRecord>>;

    /// Persists the POI set just notified for a key (insert or replace).
    ///
    /// Called only after the notifier accepted the delivery.
    fn record_notified(
        &self,
        deployment: &DeploymentId,
        block_number: u64,
        poi_set: &PoiSet,
        message: &str,
    ) -> Result<()>;

    /// Whether a reuse notification has ever been sent for this hash.
    ///
    /// A reuse event, once reported, is permanently closed.
    fn reuse_reported(&self, poi: &PoiHash) -> Result<bool>;

    /// Marks a reuse notification as sent for this hash.
    fn mark_reuse_reported(&self, poi: &PoiHash) -> Result<()>;

    /// Deletes discrepancy records older than `days` days.
    ///
    /// Returns the number of rows removed. The reuse ledger is never
    /// touched: reuse must be detectable arbitrarily far apart in time.
    fn purge_stale(&self, days: u32) -> Result<usize>;
}

/// Trait for the global reuse index.
///
/// Globally consistent across all deployments and networks; entries are
/// append-only and never evicted.
pub trait ReuseIndex: Send + Sync {
    /// Looks up the first-seen origin of a hash.
    fn lookup(&self, poi: &PoiHash) -> Result<Option<ReuseIndexEntry>>;

    /// Registers an origin for a hash unless one already exists.
    ///
    /// Atomic insert-if-absent: concurrent registration of the same hash is
    /// safe and exactly one caller wins. Returns `true` if this call
    /// created the entry.
    fn register_if_absent(&self, poi: &PoiHash, origin: &ReuseIndexEntry) -> Result<bool>;
}
