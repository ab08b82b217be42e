//! Interned dictionaries of textual evidence: tags, observables, and
//! profile points. Names/values are immutable once assigned an id.

use crate::model::ModelManager;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

pub struct TagBmc;

impl TagBmc {
    pub async fn get_by_name(mm: &ModelManager, name: &str) -> Result<Option<Tag>> {
        let mut rows = mm
            .db()
            .query("SELECT id, name FROM tags WHERE name = ?1", libsql::params![name])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    /// `INSERT OR IGNORE` then re-select: the port's analog of the
    /// original's `INSERT IGNORE` + duplicate-key-as-success pattern.
    pub async fn get_or_create(mm: &ModelManager, name: &str) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
                libsql::params![name],
            )
            .await?;
        match Self::get_by_name(mm, name).await? {
            Some(tag) => Ok(tag.id),
            None => Err(crate::Error::TagNotFound(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observable {
    pub id: i64,
    #[serde(rename = "type")]
    pub observable_type: String,
    pub value: String,
}

pub struct ObservableBmc;

impl ObservableBmc {
    pub async fn get_by_type_value(
        mm: &ModelManager,
        observable_type: &str,
        value: &str,
    ) -> Result<Option<Observable>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, type, value FROM observables WHERE type = ?1 AND value = ?2",
                libsql::params![observable_type, value],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Observable {
                id: row.get(0)?,
                observable_type: row.get(1)?,
                value: row.get(2)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_or_create(
        mm: &ModelManager,
        observable_type: &str,
        value: &str,
    ) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO observables (type, value) VALUES (?1, ?2)",
                libsql::params![observable_type, value],
            )
            .await?;
        match Self::get_by_type_value(mm, observable_type, value).await? {
            Some(obs) => Ok(obs.id),
            None => Err(crate::Error::ObservableNotFound(
                observable_type.to_string(),
                value.to_string(),
            )),
        }
    }

    /// Tags an observable (e.g. `ORIGINAL_EMAIL`, `NO_SCAN`, `ARCHIVE`
    /// directives from the bro-SMTP and mailbox ingestion paths).
    pub async fn add_tag(mm: &ModelManager, observable_id: i64, tag_name: &str) -> Result<()> {
        let tag_id = TagBmc::get_or_create(mm, tag_name).await?;
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO observable_tag_mapping (observable_id, tag_id) VALUES (?1, ?2)",
                libsql::params![observable_id, tag_id],
            )
            .await?;
        Ok(())
    }

    pub async fn tags_for(mm: &ModelManager, observable_id: i64) -> Result<Vec<String>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT t.name FROM tags t \
                 JOIN observable_tag_mapping m ON m.tag_id = t.id \
                 WHERE m.observable_id = ?1",
                libsql::params![observable_id],
            )
            .await?;
        let mut names = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePoint {
    pub id: i64,
    pub description: String,
}

pub struct ProfilePointBmc;

impl ProfilePointBmc {
    pub async fn get_by_description(
        mm: &ModelManager,
        description: &str,
    ) -> Result<Option<ProfilePoint>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, description FROM profile_points WHERE description = ?1",
                libsql::params![description],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(ProfilePoint {
                id: row.get(0)?,
                description: row.get(1)?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::new_db_pool_at;
    use alert_common::config::AppConfig;
    use std::sync::Arc;

    async fn test_mm() -> ModelManager {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("dict_test.db")).await.unwrap();
        ModelManager::new_for_test(db, Arc::new(AppConfig::default()))
    }

    #[tokio::test]
    async fn test_tag_get_or_create_is_idempotent() {
        let mm = test_mm().await;
        let id1 = TagBmc::get_or_create(&mm, "phishing").await.unwrap();
        let id2 = TagBmc::get_or_create(&mm, "phishing").await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_observable_tagging() {
        let mm = test_mm().await;
        let obs_id = ObservableBmc::get_or_create(&mm, "file_path", "email.rfc822")
            .await
            .unwrap();
        ObservableBmc::add_tag(&mm, obs_id, "ORIGINAL_EMAIL").await.unwrap();
        ObservableBmc::add_tag(&mm, obs_id, "NO_SCAN").await.unwrap();
        let tags = ObservableBmc::tags_for(&mm, obs_id).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&"ORIGINAL_EMAIL".to_string()));
    }
}
