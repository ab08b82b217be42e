//! Comment: a free-text annotation thread on an alert.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub alert_id: i64,
    pub user_id: Option<i64>,
    pub comment: String,
    pub insert_date: String,
}

pub struct CommentBmc;

impl CommentBmc {
    pub async fn create(
        mm: &ModelManager,
        alert_id: i64,
        user_id: Option<i64>,
        comment: &str,
    ) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO comments (alert_id, user_id, comment) VALUES (?1, ?2, ?3)",
                libsql::params![alert_id, user_id, comment],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn list_for_alert(mm: &ModelManager, alert_id: i64) -> Result<Vec<Comment>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, alert_id, user_id, comment, insert_date FROM comments \
                 WHERE alert_id = ?1 ORDER BY id ASC",
                libsql::params![alert_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(Comment {
                id: row.get(0)?,
                alert_id: row.get(1)?,
                user_id: row.get(2)?,
                comment: row.get(3)?,
                insert_date: row.get(4)?,
            });
        }
        Ok(out)
    }

    pub async fn delete(mm: &ModelManager, id: i64) -> Result<()> {
        let affected = mm
            .db()
            .execute("DELETE FROM comments WHERE id = ?1", libsql::params![id])
            .await?;
        if affected == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::new_db_pool_at;
    use alert_common::config::AppConfig;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_mm() -> ModelManager {
        let dir = tempfile::tempdir().unwrap();
        let db = new_db_pool_at(dir.path().join("comment_test.db")).await.unwrap();
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
    async fn test_create_list_delete() {
        let mm = test_mm().await;
        let alert_id = seed_alert(&mm).await;
        let id = CommentBmc::create(&mm, alert_id, None, "looks phishy").await.unwrap();
        let comments = CommentBmc::list_for_alert(&mm, alert_id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment, "looks phishy");

        CommentBmc::delete(&mm, id).await.unwrap();
        assert!(CommentBmc::list_for_alert(&mm, alert_id).await.unwrap().is_empty());
    }
}
