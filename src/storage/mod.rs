//! Durable state: notification records and the reuse index.
//!
//! Two stores back the idempotence guarantees:
//!
//! - **Notification state** ([`NotificationStore`]): one record per
//!   `(deployment, block)` holding the POI set last notified, plus the
//!   permanent per-hash ledger of reported reuse.
//! - **Reuse index** ([`ReuseIndex`]): the one piece of shared state that
//!   crosses deployment boundaries: a global map from POI hash to its
//!   first-seen origin.
//!
//! The detection engine owns no persistent state; these traits are the only
//! components permitted to mutate durable state. [`SqliteStateStore`]
//! implements both over a single WAL-mode SQLite database.

mod sqlite;
mod traits;

pub use sqlite::SqliteStateStore;
pub use traits::{NotificationRecord, NotificationStore, ReuseIndex};
