//! # Model Layer - BMC Pattern Implementation
//!
//! Each entity has:
//! - **Data Struct**: serializable model (e.g. `Alert`, `Tag`)
//! - **ForCreate Struct**: input for creation operations
//! - **Bmc Struct**: stateless controller with async CRUD methods
//!
//! ## Available Controllers
//!
//! | BMC | Description |
//! |-----|-------------|
//! | `alert::AlertBmc` | Alert aggregate: insert, sync, status, SLA |
//! | `dictionary::TagBmc` | Interned tag dictionary |
//! | `dictionary::ObservableBmc` | Interned observable dictionary |
//! | `dictionary::ProfilePointBmc` | Interned profile-point dictionary |
//! | `mapping::MappingSynchronizer` | Idempotent alert↔{tag,observable,pp} edges |
//! | `workload::WorkloadBmc` | Hand-off queue to analysis workers |
//! | `delayed_analysis::DelayedAnalysisBmc` | Pending-observable tracking |
//! | `event::EventBmc` | Event roll-up over alerts |
//! | `company::CompanyBmc`, `user::UserBmc` | Supporting curation entities |
//! | `campaign::CampaignBmc`, `malware::MalwareBmc`, `threat::ThreatBmc` | Curation taxonomy |
//! | `remediation::RemediationBmc`, `comment::CommentBmc` | Alert annotations |
//!
//! ## ModelManager
//!
//! The [`ModelManager`] provides centralized access to the database
//! connection, the process-wide [`ConnectionCache`], and configuration.

pub mod alert;
pub mod campaign;
pub mod comment;
pub mod company;
pub mod delayed_analysis;
pub mod dictionary;
pub mod event;
pub mod malware;
pub mod mapping;
pub mod remediation;
pub mod threat;
pub mod user;
pub mod workload;

use crate::store::conn_cache::{ConnectionCache, ScopedConn};
use crate::store::{self, Db};
use crate::Result;
use alert_common::config::{parse_lock_timeout, AppConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct ModelManager {
    pub(crate) db: Db,
    /// On-disk path this manager's `db` handle was opened against, when
    /// known; lets [`Self::scoped_conn`] open a genuinely fresh connection
    /// on a cache miss instead of reusing `db` itself. `None` for plain
    /// test managers ([`Self::new_for_test`]), which have no path to
    /// reopen and fall back to sharing `db`.
    db_path: Option<PathBuf>,
    conn_cache: Arc<ConnectionCache>,
    app_config: Arc<AppConfig>,
}

impl ModelManager {
    pub async fn new(app_config: Arc<AppConfig>) -> Result<Self> {
        let db_path = PathBuf::from("data/alert_core.db");
        let db = store::new_db_pool_at(db_path.clone()).await?;
        Ok(ModelManager {
            db,
            db_path: Some(db_path),
            conn_cache: Arc::new(ConnectionCache::new()),
            app_config,
        })
    }

    /// Constructor for testing with a custom db connection. Public so
    /// integration tests in `tests/` can build a `ModelManager` against a
    /// temp-directory database.
    pub fn new_for_test(db: Db, app_config: Arc<AppConfig>) -> Self {
        ModelManager {
            db,
            db_path: None,
            conn_cache: Arc::new(ConnectionCache::new()),
            app_config,
        }
    }

    /// Like [`Self::new_for_test`] but also records the on-disk path `db`
    /// was opened against, so [`Self::scoped_conn`] can exercise its real
    /// fresh-connection path under test instead of the no-path fallback.
    pub fn new_for_test_with_path(db: Db, db_path: PathBuf, app_config: Arc<AppConfig>) -> Self {
        ModelManager {
            db,
            db_path: Some(db_path),
            conn_cache: Arc::new(ConnectionCache::new()),
            app_config,
        }
    }

    pub(in crate::model) fn db(&self) -> &Db {
        &self.db
    }

    /// Returns the db connection for integration tests.
    pub fn db_for_test(&self) -> &Db {
        &self.db
    }

    pub fn conn_cache(&self) -> &Arc<ConnectionCache> {
        &self.conn_cache
    }

    /// Acquires a [`ConnectionCache`]-backed scoped connection for the
    /// logical database `name`, validated the same way any other cached
    /// handle is (rollback probe on a hit, fresh open via
    /// [`store::get_db_connection`] on a miss or when caching is
    /// disabled). Falls back to sharing this manager's own `db` handle
    /// when no on-disk path is known.
    pub async fn scoped_conn<'a>(&'a self, name: &str) -> Result<ScopedConn<'a>> {
        let db_path = self.db_path.clone();
        let fallback = self.db.clone();
        self.conn_cache
            .scoped(name, move || async move {
                match db_path {
                    Some(path) => store::get_db_connection(&path).await,
                    None => Ok(fallback),
                }
            })
            .await
    }

    pub fn app_config(&self) -> &Arc<AppConfig> {
        &self.app_config
    }

    /// This process/host's node identity (`global.node`), used as
    /// `lock_owner` and as `workload.node`.
    pub fn node(&self) -> &str {
        &self.app_config.global.node
    }

    /// Parsed `global.lock_timeout`, in seconds. Falls back to 1800s (30
    /// minutes) if the configured value doesn't match the `MM:SS` shape
    /// ([`crate::utils::validation::validate_lock_timeout`]) or fails to
    /// parse.
    pub fn lock_timeout_secs(&self) -> i64 {
        let raw = &self.app_config.global.lock_timeout;
        if let Err(e) = crate::utils::validation::validate_lock_timeout(raw) {
            tracing::warn!(raw = %raw, error = %e, "invalid global.lock_timeout, falling back to 1800s");
            return 1800;
        }
        parse_lock_timeout(raw).unwrap_or(1800)
    }

    /// Health check - verify database connectivity.
    pub async fn health_check(&self) -> Result<bool> {
        let mut rows = self.db.query("SELECT 1", ()).await?;
        Ok(rows.next().await?.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::new_db_pool_at;

    async fn test_mm_with_timeout(lock_timeout: &str) -> ModelManager {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("model_mgr_test.db")).await.unwrap();
        let mut config = AppConfig::default();
        config.global.lock_timeout = lock_timeout.to_string();
        ModelManager::new_for_test(db, Arc::new(config))
    }

    #[tokio::test]
    async fn test_lock_timeout_secs_parses_valid_shape() {
        let mm = test_mm_with_timeout("05:00").await;
        assert_eq!(mm.lock_timeout_secs(), 300);
    }

    #[tokio::test]
    async fn test_lock_timeout_secs_falls_back_on_invalid_shape() {
        let mm = test_mm_with_timeout("not-a-timeout").await;
        assert_eq!(mm.lock_timeout_secs(), 1800);
    }

    #[tokio::test]
    async fn test_new_for_test_has_no_db_path() {
        let mm = test_mm_with_timeout("00:30").await;
        // No path known: scoped_conn falls back to sharing `db` rather
        // than reopening, so it should never fail even against a handle
        // that was never written to disk under a stable name.
        let scoped = mm.scoped_conn("alerts").await.unwrap();
        scoped.conn().execute("SELECT 1", ()).await.unwrap();
    }
}
