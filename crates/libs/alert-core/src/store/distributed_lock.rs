//! Cooperative, expiring, transferable lock over an alert row.
//!
//! State lives entirely in the `(lock_owner, lock_id, lock_time)` columns
//! on `alerts`. Nothing in the database enforces that a holder actually
//! holds the lock ("advisory"); correctness instead follows from the
//! atomicity of a single conditional `UPDATE ... WHERE` followed by a
//! read-back of the resulting owner token. All expiry comparisons are
//! evaluated in SQL against the row's `lock_time` and the database's own
//! clock, to avoid skew between worker hosts.

use crate::store::{retry_on_contention, Db};
use crate::Result;
use uuid::Uuid;

/// A lock handle bound to a single alert id.
///
/// Holds, at most, one locally-remembered token at a time. The token is
/// proof of ownership; it is compared against the row on every
/// `unlock`/`refresh`/`is_locked` call rather than trusted blindly.
pub struct DistributedAlertLock {
    db: Db,
    alert_id: i64,
    node: String,
    lock_timeout_secs: i64,
    token: Option<String>,
}

impl DistributedAlertLock {
    pub fn new(db: Db, alert_id: i64, node: impl Into<String>, lock_timeout_secs: i64) -> Self {
        Self {
            db,
            alert_id,
            node: node.into(),
            lock_timeout_secs,
            token: None,
        }
    }

    /// Attempts to acquire the lock: unheld rows are claimed outright,
    /// rows held by this same token are a no-op success, and rows whose
    /// `lock_time` has aged past the timeout are stolen from the previous
    /// holder.
    pub async fn lock(&mut self) -> Result<bool> {
        let token = Uuid::new_v4().to_string();

        retry_on_contention(|| async {
            self.db
                .execute(
                    "UPDATE alerts SET lock_owner = ?1, lock_id = ?2, \
                     lock_time = strftime('%Y-%m-%d %H:%M:%S', 'now') \
                     WHERE id = ?3 AND lock_owner IS NULL",
                    libsql::params![self.node.clone(), token.clone(), self.alert_id],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;

        let observed = self.read_lock_state().await?;
        let Some((observed_id, observed_age)) = observed else {
            return Ok(false);
        };

        if observed_id.as_deref() == Some(token.as_str()) {
            self.token = Some(token);
            return Ok(true);
        }

        let Some(age) = observed_age else {
            return Ok(false);
        };

        if age <= self.lock_timeout_secs {
            // Actively held by someone else.
            return Ok(false);
        }

        // Expired: attempt a steal keyed off the observed old token.
        let Some(observed_id) = observed_id else {
            return Ok(false);
        };

        retry_on_contention(|| async {
            self.db
                .execute(
                    "UPDATE alerts SET lock_owner = ?1, lock_id = ?2, \
                     lock_time = strftime('%Y-%m-%d %H:%M:%S', 'now') \
                     WHERE id = ?3 AND lock_id = ?4",
                    libsql::params![self.node.clone(), token.clone(), self.alert_id, observed_id.clone()],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;

        let reobserved = self.read_lock_state().await?;
        match reobserved {
            Some((Some(id), _)) if id == token => {
                self.token = Some(token);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Releases the lock iff the row still shows our token.
    pub async fn unlock(&mut self) -> Result<bool> {
        let Some(token) = self.token.take() else {
            return Ok(false);
        };

        let affected = retry_on_contention(|| async {
            self.db
                .execute(
                    "UPDATE alerts SET lock_owner = NULL, lock_id = NULL, lock_time = NULL \
                     WHERE id = ?1 AND lock_id = ?2",
                    libsql::params![self.alert_id, token.clone()],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;

        Ok(affected > 0)
    }

    /// Refreshes `lock_time` (and stamps a fresh `lock_transaction_id`)
    /// iff the row still shows our token. Same 0-row semantics as
    /// `unlock`: the local token is cleared and `false` is returned if the
    /// lock was already lost.
    pub async fn refresh(&mut self) -> Result<bool> {
        let Some(token) = self.token.clone() else {
            return Ok(false);
        };
        let txn_id = Uuid::new_v4().to_string();

        let affected = retry_on_contention(|| async {
            self.db
                .execute(
                    "UPDATE alerts SET lock_time = strftime('%Y-%m-%d %H:%M:%S', 'now'), \
                     lock_transaction_id = ?1 WHERE id = ?2 AND lock_id = ?3",
                    libsql::params![txn_id.clone(), self.alert_id, token.clone()],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;

        if affected == 0 {
            self.token = None;
        }
        Ok(affected > 0)
    }

    /// DB-truth check: held iff `lock_id` is non-null and `lock_time` is
    /// within the timeout window. Never consults the local token.
    pub async fn is_locked(&self) -> Result<bool> {
        let state = self.read_lock_state().await?;
        Ok(matches!(state, Some((Some(_), Some(age))) if age <= self.lock_timeout_secs))
    }

    /// Local-only: whether this handle currently remembers a token.
    pub fn has_current_lock(&self) -> bool {
        self.token.is_some()
    }

    /// Moves the in-memory token into `other`, leaving this handle
    /// unlocked locally. Does not touch the database: the row still shows
    /// the same `lock_id`, it's only the in-process owner that changes.
    pub fn transfer_to(&mut self, other: &mut DistributedAlertLock) {
        other.token = self.token.take();
    }

    /// Returns a new handle bound to the same alert id, with no local
    /// token. Used to hand a locked row to a child process/task, which
    /// receives the token separately (e.g. via `transfer_to`) and then
    /// calls `unlock()`.
    pub fn create_proxy(&self) -> DistributedAlertLock {
        DistributedAlertLock {
            db: self.db.clone(),
            alert_id: self.alert_id,
            node: self.node.clone(),
            lock_timeout_secs: self.lock_timeout_secs,
            token: None,
        }
    }

    /// Reads `(lock_id, age_seconds)` for this alert, with the age
    /// computed in SQL against the database's own clock. Returns `None`
    /// if the row doesn't exist.
    async fn read_lock_state(&self) -> Result<Option<(Option<String>, Option<i64>)>> {
        let mut rows = self
            .db
            .query(
                "SELECT lock_id, \
                 CASE WHEN lock_time IS NULL THEN NULL \
                      ELSE CAST(strftime('%s', 'now') - strftime('%s', lock_time) AS INTEGER) \
                 END \
                 FROM alerts WHERE id = ?1",
                libsql::params![self.alert_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let lock_id: Option<String> = row.get(0)?;
        let age: Option<i64> = row.get(1)?;
        Ok(Some((lock_id, age)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::new_db_pool_at;

    async fn seed_alert(db: &Db) -> i64 {
        db.execute(
            "INSERT INTO alerts (uuid, storage_dir, location, tool, tool_instance, alert_type, \
             description, priority, event_time) VALUES (?1, ?2, 'node-a', 'test', 'test', \
             'unittest', 'desc', 0, strftime('%Y-%m-%d %H:%M:%S', 'now'))",
            libsql::params![Uuid::new_v4().to_string(), format!("/tmp/{}", Uuid::new_v4())],
        )
        .await
        .unwrap();
        db.last_insert_rowid()
    }

    async fn test_db() -> Db {
        let dir = tempfile::tempdir().unwrap();
        new_db_pool_at(dir.path().join("lock_test.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_lock_unlock_cycle() {
        let db = test_db().await;
        let alert_id = seed_alert(&db).await;

        let mut lock_a = DistributedAlertLock::new(db.clone(), alert_id, "node-a", 1800);
        assert!(lock_a.lock().await.unwrap());
        assert!(lock_a.is_locked().await.unwrap());

        let mut lock_b = DistributedAlertLock::new(db.clone(), alert_id, "node-b", 1800);
        assert!(!lock_b.lock().await.unwrap());

        assert!(lock_a.unlock().await.unwrap());
        assert!(!lock_a.is_locked().await.unwrap());
        assert!(!lock_a.unlock().await.unwrap());
        assert!(lock_b.lock().await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_stolen() {
        let db = test_db().await;
        let alert_id = seed_alert(&db).await;

        let mut lock_a = DistributedAlertLock::new(db.clone(), alert_id, "node-a", 0);
        assert!(lock_a.lock().await.unwrap());
        assert!(!lock_a.is_locked().await.unwrap());
        assert!(lock_a.has_current_lock());

        let mut lock_b = DistributedAlertLock::new(db.clone(), alert_id, "node-b", 0);
        assert!(lock_b.lock().await.unwrap());
    }

    #[tokio::test]
    async fn test_proxy_transfer() {
        let db = test_db().await;
        let alert_id = seed_alert(&db).await;

        let mut parent = DistributedAlertLock::new(db.clone(), alert_id, "node-a", 1800);
        assert!(parent.lock().await.unwrap());

        let mut proxy = parent.create_proxy();
        parent.transfer_to(&mut proxy);

        assert!(proxy.unlock().await.unwrap());
        assert!(!parent.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_without_transfer_fails_for_proxy() {
        let db = test_db().await;
        let alert_id = seed_alert(&db).await;

        let mut parent = DistributedAlertLock::new(db.clone(), alert_id, "node-a", 1800);
        assert!(parent.lock().await.unwrap());

        let mut proxy = parent.create_proxy();
        assert!(!proxy.unlock().await.unwrap());
        assert!(parent.is_locked().await.unwrap());
    }
}
