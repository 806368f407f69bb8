//! Bounded SQLite connection pool
//!
//! The pool caps the number of open connections independently of how many
//! workers share it. Checkouts block while every connection is in use, so
//! async callers go through [`with_store`](crate::storage::with_store),
//! which runs the store call on tokio's blocking thread pool.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::StorageResult;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a checkout waits for a free connection
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool of connections to one SQLite database file
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;

/// A connection checked out of a [`ConnectionPool`], returned on drop
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Opens a pool and provisions the schema
///
/// The schema is provisioned through the first checkout, so a bad path or
/// schema failure is reported here rather than on first use.
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `max_open` - Maximum number of simultaneously open connections
/// * `max_idle` - Connections kept open while unused
pub fn open_pool(path: &Path, max_open: usize, max_idle: usize) -> StorageResult<ConnectionPool> {
    let max_open = max_open.max(1);
    let max_idle = max_idle.min(max_open);

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
    });

    let pool = r2d2::Pool::builder()
        .max_size(max_open as u32)
        .min_idle(Some(max_idle as u32))
        .connection_timeout(CHECKOUT_TIMEOUT)
        .build(manager)?;

    let conn = pool.get()?;
    initialize_schema(&conn)?;

    Ok(pool)
}
