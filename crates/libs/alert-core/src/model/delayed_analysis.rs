//! Pending-observable tracking (`delayed_analysis`): a 3-tuple set
//! indicating that analysis of an observable is pending for a named
//! module. `track_delayed_analysis_start`/`stop` populate and clear it.

use crate::model::ModelManager;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedAnalysis {
    pub alert_id: i64,
    pub observable_id: i64,
    pub analysis_module: String,
}

pub struct DelayedAnalysisBmc;

impl DelayedAnalysisBmc {
    pub async fn track_start(
        mm: &ModelManager,
        alert_id: i64,
        observable_id: i64,
        analysis_module: &str,
    ) -> Result<()> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO delayed_analysis (alert_id, observable_id, analysis_module) \
                 VALUES (?1, ?2, ?3)",
                libsql::params![alert_id, observable_id, analysis_module],
            )
            .await?;
        Ok(())
    }

    pub async fn track_stop(
        mm: &ModelManager,
        alert_id: i64,
        observable_id: i64,
        analysis_module: &str,
    ) -> Result<()> {
        mm.db()
            .execute(
                "DELETE FROM delayed_analysis \
                 WHERE alert_id = ?1 AND observable_id = ?2 AND analysis_module = ?3",
                libsql::params![alert_id, observable_id, analysis_module],
            )
            .await?;
        Ok(())
    }

    pub async fn is_pending(mm: &ModelManager, alert_id: i64) -> Result<bool> {
        let mut rows = mm
            .db()
            .query(
                "SELECT 1 FROM delayed_analysis WHERE alert_id = ?1 LIMIT 1",
                libsql::params![alert_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn list_for_alert(mm: &ModelManager, alert_id: i64) -> Result<Vec<DelayedAnalysis>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT alert_id, observable_id, analysis_module FROM delayed_analysis \
                 WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(DelayedAnalysis {
                alert_id: row.get(0)?,
                observable_id: row.get(1)?,
                analysis_module: row.get(2)?,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::dictionary::ObservableBmc;
    use crate::store::new_db_pool_at;
    use alert_common::config::AppConfig;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_mm() -> ModelManager {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("delayed_test.db")).await.unwrap();
        ModelManager::new_for_test(db, Arc::new(AppConfig::default()))
    }

    async fn seed_alert(mm: &ModelManager) -> i64 {
        mm.db()
            .execute(
                "INSERT INTO alerts (uuid, storage_dir, location, tool, tool_instance, \
                 alert_type, description, priority, event_time) VALUES \
                 (?1, ?2, 'node-a', 'test', 'test', 'unittest', 'desc', 0, \
                 strftime('%Y-%m-%d %H:%M:%S', 'now'))",
                libsql::params![Uuid::new_v4().to_string(), format!("/tmp/{}", Uuid::new_v4())],
            )
            .await
            .unwrap();
        mm.db_for_test().last_insert_rowid()
    }

    #[tokio::test]
    async fn test_start_then_stop_clears_pending() {
        let mm = test_mm().await;
        let alert_id = seed_alert(&mm).await;
        let obs_id = ObservableBmc::get_or_create(&mm, "ipv4", "1.2.3.4").await.unwrap();

        DelayedAnalysisBmc::track_start(&mm, alert_id, obs_id, "whois").await.unwrap();
        assert!(DelayedAnalysisBmc::is_pending(&mm, alert_id).await.unwrap());

        DelayedAnalysisBmc::track_stop(&mm, alert_id, obs_id, "whois").await.unwrap();
        assert!(!DelayedAnalysisBmc::is_pending(&mm, alert_id).await.unwrap());
    }
}
