//! Embedded schema migrations for the state database.
//!
//! Migrations are tracked with the `SQLite` `user_version` pragma and
//! applied in order inside a transaction each, so a crash mid-migration
//! leaves the database at the last completed version.
//!
//! The v1→v2 step is the schema evolution the notification comparison
//! depends on: `poi_set` is added with `NOT NULL DEFAULT '[]'`, backfilling
//! every pre-existing row with the empty set rather than NULL, so set
//! equality in the reconcile filter never encounters an undefined value.

use crate::{Error, Result};
use rusqlite::Connection;

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i32,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply (may contain multiple statements).
    pub sql: &'static str,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "notification history per deployment/block",
        sql: "
            CREATE TABLE IF NOT EXISTS poi_notifications (
                deployment_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (deployment_id, block_number)
            );
            CREATE INDEX IF NOT EXISTS idx_poi_notifications_updated_at
            ON poi_notifications (updated_at);
        ",
    },
    Migration {
        version: 2,
        description: "poi_set column, backfilled with the empty set",
        sql: "
            ALTER TABLE poi_notifications
            ADD COLUMN poi_set TEXT NOT NULL DEFAULT '[]';
        ",
    },
    Migration {
        version: 3,
        description: "global reuse index and permanent reuse report ledger",
        sql: "
            CREATE TABLE IF NOT EXISTS reuse_index (
                poi_hash TEXT PRIMARY KEY,
                deployment_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                indexer_id TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS reuse_reports (
                poi_hash TEXT PRIMARY KEY,
                reported_at TEXT NOT NULL
            );
        ",
    },
];

/// Applies all pending migrations.
///
/// # Errors
///
/// Returns [`Error::StoreUnavailable`] if a migration fails; the database
/// stays at the last completed version.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(store_err("read user_version"))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn
            .transaction()
            .map_err(store_err("begin migration transaction"))?;
        tx.execute_batch(migration.sql)
            .map_err(store_err(migration.description))?;
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(store_err("bump user_version"))?;
        tx.commit().map_err(store_err("commit migration"))?;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied state database migration"
        );
    }

    Ok(())
}

fn store_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::StoreUnavailable {
        store: "notifications",
        cause: format!("{context}: {e}"),
    }
}
