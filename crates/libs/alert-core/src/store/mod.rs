//! Low-level storage operations: database connection management, PRAGMA
//! tuning, migrations, and the contention-retry helper shared by the lock
//! and mapping-synchronizer modules.
//!
//! # Database Configuration
//!
//! The database is configured for high-concurrency, multi-process access:
//! - WAL mode for concurrent reads during writes
//! - 30-second busy timeout for lock contention
//! - 64MB cache for reduced I/O
//!
//! # Example
//!
//! ```no_run
//! use alert_core::store::new_db_pool;
//!
//! async fn setup() -> alert_core::Result<()> {
//!     let db = new_db_pool().await?;
//!     // Database is ready with migrations applied
//!     Ok(())
//! }
//! ```

use crate::{Error, Result};
use libsql::{Builder, Connection};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Type alias for database connections.
pub type Db = Connection;

pub mod conn_cache;
pub mod distributed_lock;

/// Maximum retry attempts for contention errors (`execute_with_retry` in
/// the original).
pub const MAX_CONTENTION_RETRIES: u32 = 2;

/// Creates a new database connection with migrations applied.
///
/// 1. Creates the `data/` directory if needed.
/// 2. Opens or creates the SQLite database.
/// 3. Applies concurrency PRAGMAs (WAL, busy_timeout, synchronous, cache_size).
/// 4. Runs all migrations.
///
/// ```no_run
/// use alert_core::store::new_db_pool;
///
/// # async fn example() -> alert_core::Result<()> {
/// let db = new_db_pool().await?;
/// # Ok(())
/// # }
/// ```
pub async fn new_db_pool() -> Result<Db> {
    new_db_pool_at(PathBuf::from("data/alert_core.db")).await
}

/// Like [`new_db_pool`] but at an explicit path; used by tests to open an
/// isolated database per test.
pub async fn new_db_pool_at(db_path: PathBuf) -> Result<Db> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Builder::new_local(&db_path).build().await?;
    let conn = db.connect()?;

    // WAL mode: concurrent reads during writes.
    let _ = conn.execute("PRAGMA journal_mode=WAL;", ()).await;
    // busy_timeout: wait rather than fail immediately under contention.
    let _ = conn.execute("PRAGMA busy_timeout=30000;", ()).await;
    // synchronous=NORMAL: safety/performance balance under WAL.
    let _ = conn.execute("PRAGMA synchronous=NORMAL;", ()).await;
    // cache_size: negative = KB, so -64000 = 64MB.
    let _ = conn.execute("PRAGMA cache_size=-64000;", ()).await;

    let migrations = [
        include_str!("../../../../../migrations/001_initial_schema.sql"),
        include_str!("../../../../../migrations/002_curation_entities.sql"),
    ];

    for migration in &migrations {
        conn.execute_batch(migration).await?;
    }

    Ok(conn)
}

/// Opens a connection to `db_path` without running migrations (the
/// database is assumed already migrated); used by
/// [`conn_cache::ConnectionCache`] when opening a fresh handle after a
/// cache miss or eviction.
pub async fn get_db_connection(db_path: &std::path::Path) -> Result<Connection> {
    let db = Builder::new_local(db_path).build().await?;
    Ok(db.connect()?)
}

/// Retries `op` up to [`MAX_CONTENTION_RETRIES`] times when it fails with a
/// contention error (`SQLITE_BUSY`/`SQLITE_LOCKED`), the port's analog of
/// the original's deadlock codes 1205/1213. All other errors propagate on
/// the first attempt.
pub async fn retry_on_contention<F, Fut, T>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_contention() && attempt < MAX_CONTENTION_RETRIES => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(20 * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_db_pool_applies_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("test.db")).await.unwrap();
        let mut rows = db
            .query("SELECT name FROM sqlite_master WHERE type='table' AND name='alerts'", ())
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retry_on_contention_gives_up_on_other_errors() {
        let result: Result<()> = retry_on_contention(|| async { Err(Error::NotFound) }).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }
}
