//! Campaign: the top of the curation taxonomy an event may be attributed
//! to.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
}

pub struct CampaignBmc;

impl CampaignBmc {
    pub async fn create(mm: &ModelManager, name: &str) -> Result<i64> {
        mm.db()
            .execute("INSERT INTO campaign (name) VALUES (?1)", libsql::params![name])
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn get(mm: &ModelManager, id: i64) -> Result<Campaign> {
        let mut rows = mm
            .db()
            .query("SELECT id, name FROM campaign WHERE id = ?1", libsql::params![id])
            .await?;
        let row = rows.next().await?.ok_or(Error::NotFound)?;
        Ok(Campaign {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::new_db_pool_at;
    use alert_common::config::AppConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("campaign_test.db")).await.unwrap();
        let mm = ModelManager::new_for_test(db, Arc::new(AppConfig::default()));

        let id = CampaignBmc::create(&mm, "Q3 Phishing Wave").await.unwrap();
        let campaign = CampaignBmc::get(&mm, id).await.unwrap();
        assert_eq!(campaign.name, "Q3 Phishing Wave");
    }
}
