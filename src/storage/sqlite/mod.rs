//! `SQLite` implementation of the durable stores.
//!
//! One WAL-mode database holds three tables:
//!
//! - `poi_notifications`: last notified POI set per `(deployment, block)`
//! - `reuse_index`: global first-seen origin per POI hash, append-only
//! - `reuse_reports`: permanent ledger of reuse notifications sent
//!
//! A single connection behind a mutex is shared by all monitor workers.
//! WAL mode plus a 5-second busy timeout keeps contention graceful; the
//! per-deployment units only touch disjoint notification keys, and
//! `register_if_absent` is a single `INSERT OR IGNORE`, so no global
//! locking beyond the connection mutex is needed.

mod connection;
mod migrations;

pub use connection::{acquire_lock, configure_connection};
pub use migrations::{MIGRATIONS, Migration, run_migrations};

use crate::models::{DeploymentId, PoiHash, PoiSet, ReuseIndexEntry};
use crate::storage::{NotificationRecord, NotificationStore, ReuseIndex};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

/// Durable state store over a single `SQLite` database.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Opens (or creates) the state database at `path` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the database cannot be opened
    /// or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::StoreUnavailable {
            store: "notifications",
            cause: format!("failed to open {}: {e}", path.display()),
        })?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database. State does not survive the process;
    /// useful for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the database cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::StoreUnavailable {
            store: "notifications",
            cause: format!("failed to open in-memory database: {e}"),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn notif_err(e: impl std::fmt::Display) -> Error {
        Error::StoreUnavailable {
            store: "notifications",
            cause: e.to_string(),
        }
    }

    fn reuse_err(e: impl std::fmt::Display) -> Error {
        Error::StoreUnavailable {
            store: "reuse_index",
            cause: e.to_string(),
        }
    }

    fn parse_timestamp(raw: &str, store: &'static str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::StoreUnavailable {
                store,
                cause: format!("corrupt timestamp '{raw}': {e}"),
            })
    }
}

impl NotificationStore for SqliteStateStore {
    fn last_notified(
        &self,
        deployment: &DeploymentId,
        block_number: u64,
    ) -> Result<Option<NotificationRecord>> {
        let conn = acquire_lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT poi_set, created_at, updated_at
                 FROM poi_notifications
                 WHERE deployment_id = ?1 AND block_number = ?2",
                params![deployment.as_str(), block_number as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(Self::notif_err)?;

        let Some((poi_set_json, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let poi_set: PoiSet = serde_json::from_str(&poi_set_json).map_err(Self::notif_err)?;
        Ok(Some(NotificationRecord {
            deployment: deployment.clone(),
            block_number,
            poi_set,
            created_at: Self::parse_timestamp(&created_at, "notifications")?,
            updated_at: Self::parse_timestamp(&updated_at, "notifications")?,
        }))
    }

    fn record_notified(
        &self,
        deployment: &DeploymentId,
        block_number: u64,
        poi_set: &PoiSet,
        message: &str,
    ) -> Result<()> {
        let poi_set_json = serde_json::to_string(poi_set).map_err(Self::notif_err)?;
        let now = Utc::now().to_rfc3339();

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO poi_notifications
             (deployment_id, block_number, poi_set, message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (deployment_id, block_number) DO UPDATE SET
                 poi_set = excluded.poi_set,
                 message = excluded.message,
                 updated_at = excluded.updated_at",
            params![
                deployment.as_str(),
                block_number as i64,
                poi_set_json,
                message,
                now
            ],
        )
        .map_err(Self::notif_err)?;
        metrics::counter!("notification_records_written_total").increment(1);
        Ok(())
    }

    fn reuse_reported(&self, poi: &PoiHash) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT 1 FROM reuse_reports WHERE poi_hash = ?1",
            params![poi.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(Self::notif_err)
    }

    fn mark_reuse_reported(&self, poi: &PoiHash) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO reuse_reports (poi_hash, reported_at)
             VALUES (?1, ?2)",
            params![poi.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(Self::notif_err)?;
        Ok(())
    }

    fn purge_stale(&self, days: u32) -> Result<usize> {
        // RFC 3339 with a fixed offset compares lexicographically, so the
        // cutoff is computed here rather than with SQLite date functions.
        let cutoff = (Utc::now() - Duration::days(i64::from(days))).to_rfc3339();

        let conn = acquire_lock(&self.conn);
        let removed = conn
            .execute(
                "DELETE FROM poi_notifications WHERE updated_at < ?1",
                params![cutoff],
            )
            .map_err(Self::notif_err)?;
        if removed > 0 {
            tracing::info!(removed, days, "Purged stale notification records");
        }
        metrics::counter!("notification_records_purged_total").increment(removed as u64);
        Ok(removed)
    }
}

impl ReuseIndex for SqliteStateStore {
    fn lookup(&self, poi: &PoiHash) -> Result<Option<ReuseIndexEntry>> {
        let conn = acquire_lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT deployment_id, block_number, indexer_id, observed_at
                 FROM reuse_index
                 WHERE poi_hash = ?1",
                params![poi.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(Self::reuse_err)?;

        let Some((deployment, block_number, indexer, observed_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ReuseIndexEntry {
            deployment: DeploymentId::from(deployment),
            block_number,
            indexer: crate::models::IndexerId::from(indexer),
            observed_at: Self::parse_timestamp(&observed_at, "reuse_index")?,
        }))
    }

    fn register_if_absent(&self, poi: &PoiHash, origin: &ReuseIndexEntry) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        // First seen wins: an existing row is never overwritten.
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO reuse_index
                 (poi_hash, deployment_id, block_number, indexer_id, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    poi.as_str(),
                    origin.deployment.as_str(),
                    origin.block_number as i64,
                    origin.indexer.as_str(),
                    origin.observed_at.to_rfc3339()
                ],
            )
            .map_err(Self::reuse_err)?;
        if inserted > 0 {
            metrics::counter!("reuse_index_registrations_total").increment(1);
        }
        Ok(inserted > 0)
    }
}
