//! Malware: unique by `name`, linked to events and to threats
//! via the `malware_mapping`/`malware_threat_mapping` join tables.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Malware {
    pub id: i64,
    pub name: String,
}

pub struct MalwareBmc;

impl MalwareBmc {
    pub async fn get_by_name(mm: &ModelManager, name: &str) -> Result<Option<Malware>> {
        let mut rows = mm
            .db()
            .query("SELECT id, name FROM malware WHERE name = ?1", libsql::params![name])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Malware {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_or_create(mm: &ModelManager, name: &str) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO malware (name) VALUES (?1)",
                libsql::params![name],
            )
            .await?;
        match Self::get_by_name(mm, name).await? {
            Some(m) => Ok(m.id),
            None => Err(Error::NotFound),
        }
    }

    pub async fn link_event(mm: &ModelManager, event_id: i64, malware_id: i64) -> Result<()> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO malware_mapping (event_id, malware_id) VALUES (?1, ?2)",
                libsql::params![event_id, malware_id],
            )
            .await?;
        Ok(())
    }

    pub async fn link_threat(mm: &ModelManager, malware_id: i64, threat_id: i64) -> Result<()> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO malware_threat_mapping (malware_id, threat_id) VALUES (?1, ?2)",
                libsql::params![malware_id, threat_id],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::event::EventBmc;
    use crate::model::threat::ThreatBmc;
    use crate::store::new_db_pool_at;
    use alert_common::config::AppConfig;
    use std::sync::Arc;

    async fn test_mm() -> ModelManager {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("malware_test.db")).await.unwrap();
        ModelManager::new_for_test(db, Arc::new(AppConfig::default()))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let mm = test_mm().await;
        let id1 = MalwareBmc::get_or_create(&mm, "Emotet").await.unwrap();
        let id2 = MalwareBmc::get_or_create(&mm, "Emotet").await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_link_event_and_threat() {
        let mm = test_mm().await;
        let malware_id = MalwareBmc::get_or_create(&mm, "Emotet").await.unwrap();
        let event_id = EventBmc::create(&mm, "Q3 wave", None).await.unwrap();
        let threat_id = ThreatBmc::create(&mm, "TA-Example", "actor").await.unwrap();

        MalwareBmc::link_event(&mm, event_id, malware_id).await.unwrap();
        MalwareBmc::link_threat(&mm, malware_id, threat_id).await.unwrap();
    }
}
