//! Per-(process,thread) keyed registry of open database handles.
//!
//! SQL drivers are not fork-safe, so a handle is never shared across
//! threads or reused blindly after a process fork. The cache keys each
//! handle by `(pid, tid, name)` and validates it with a rollback probe
//! before handing it back out. Callers supply how to open a fresh handle
//! on a cache miss (a path-based reopen in production, or any other
//! opener a caller has on hand), so the cache itself stays storage-agnostic.

use crate::store::Db;
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::thread::ThreadId;

type CacheKey = (u32, ThreadId, String);

/// Per-(process,thread) registry of open [`Db`] handles, one per logical
/// database name.
///
/// Caching is opt-in per (pid,tid): call [`ConnectionCache::enable`] before
/// [`ConnectionCache::acquire`] will reuse handles; otherwise every
/// `acquire` opens a fresh connection.
pub struct ConnectionCache {
    enabled: Mutex<std::collections::HashSet<(u32, ThreadId)>>,
    handles: Mutex<HashMap<CacheKey, Db>>,
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self {
            enabled: Mutex::new(std::collections::HashSet::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn current_key_prefix() -> (u32, ThreadId) {
        (std::process::id(), std::thread::current().id())
    }

    /// Marks the current (pid,tid) as caching-enabled.
    pub fn enable(&self) {
        let key = Self::current_key_prefix();
        self.enabled.lock().unwrap_or_else(|e| e.into_inner()).insert(key);
    }

    /// Closes and removes every cached handle for the current (pid,tid),
    /// then unmarks it. Close errors are swallowed (the handle is being
    /// discarded regardless).
    pub async fn disable(&self) {
        let key = Self::current_key_prefix();
        self.enabled.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);

        let stale: Vec<CacheKey> = {
            let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles
                .keys()
                .filter(|(pid, tid, _)| (*pid, *tid) == key)
                .cloned()
                .collect()
        };
        for k in stale {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.remove(&k);
        }
    }

    fn is_enabled(&self) -> bool {
        let key = Self::current_key_prefix();
        self.enabled.lock().unwrap_or_else(|e| e.into_inner()).contains(&key)
    }

    /// Returns a handle for `name`. If caching is disabled for the current
    /// (pid,tid), always opens a fresh connection via `open_fresh`. If
    /// enabled, reuses a cached handle after validating it with a
    /// rollback probe; a failed probe evicts the stale handle and opens a
    /// replacement via `open_fresh`.
    pub async fn acquire<F, Fut>(&self, name: &str, open_fresh: F) -> Result<Db>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Db>>,
    {
        if !self.is_enabled() {
            return open_fresh().await;
        }

        let (pid, tid) = Self::current_key_prefix();
        let key: CacheKey = (pid, tid, name.to_string());

        let cached = {
            let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.get(&key).cloned()
        };

        if let Some(conn) = cached {
            if Self::rollback_probe(&conn).await {
                return Ok(conn);
            }
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.remove(&key);
        }

        let fresh = open_fresh().await?;
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.insert(key, fresh.clone());
        Ok(fresh)
    }

    /// Issues `ROLLBACK` against `conn` to check it is still live. A clean
    /// rollback (even a no-op one, since nothing is necessarily open) means
    /// the handle is healthy; any driver error means it's stale.
    async fn rollback_probe(conn: &Db) -> bool {
        conn.execute("ROLLBACK", ()).await.is_ok() || conn.execute("SELECT 1", ()).await.is_ok()
    }

    /// Produces a scope-guarded handle for `name`. On normal drop nothing
    /// happens; call [`ScopedConn::fail`] on the exit path where the
    /// caller's own operation failed, to roll back (if cached) or close
    /// (if not) the handle. Errors during that cleanup are logged and
    /// swallowed so the original failure surfaces to the caller.
    pub async fn scoped<'a, F, Fut>(&'a self, name: &str, open_fresh: F) -> Result<ScopedConn<'a>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Db>>,
    {
        let conn = self.acquire(name, open_fresh).await?;
        Ok(ScopedConn {
            cache: self,
            name: name.to_string(),
            conn: Some(conn),
            cached: self.is_enabled(),
        })
    }

    /// Number of cached handles, across all (pid,tid,name) keys. Exposed
    /// for tests.
    pub fn len(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scope guard returned by [`ConnectionCache::scoped`].
pub struct ScopedConn<'a> {
    cache: &'a ConnectionCache,
    name: String,
    conn: Option<Db>,
    cached: bool,
}

impl<'a> ScopedConn<'a> {
    pub fn conn(&self) -> &Db {
        self.conn.as_ref().expect("ScopedConn polled after fail()")
    }

    /// Signals that the caller's operation failed: rolls back (if this
    /// handle is cached, so it can be reused) or closes (if not cached,
    /// since nothing will reuse it). Any error here is swallowed.
    pub async fn fail(mut self) {
        if let Some(conn) = self.conn.take() {
            if self.cached {
                if let Err(e) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!(name = %self.name, error = %e, "rollback on scoped-conn failure path errored, swallowing");
                }
            } else {
                drop(conn);
            }
        }
    }
}
