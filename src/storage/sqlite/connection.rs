//! Shared connection handling for the `SQLite` state store.

use crate::Result;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire the connection mutex with poison recovery.
///
/// If the mutex is poisoned (a panic in a previous critical section), the
/// inner value is recovered and a warning logged. The connection state is
/// still valid; refusing to recover would cascade the failure into every
/// subsequent deployment unit.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for concurrent monitor workers.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds for locks instead of
///   surfacing `SQLITE_BUSY` to a worker
///
/// # Errors
///
/// Currently infallible; kept fallible for parity with the other store
/// setup steps.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a string like "wal" which would make
    // execute_batch fail, so pragma_update results are ignored
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");

    Ok(())
}
