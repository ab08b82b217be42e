//! WorkloadQueue: the hand-off queue that makes new alerts visible to
//! analysis workers.
//!
//! Producers `INSERT workload(alert_id)` with `node` null. Consumers claim
//! the oldest unclaimed row by assigning their own node in a single
//! `UPDATE ... WHERE id = (SELECT ... LIMIT 1) RETURNING` statement, in
//! place of the `UPDATE ... LIMIT 1 RETURNING` shorthand one might reach
//! for first (SQLite's `UPDATE` doesn't support `LIMIT` without a
//! non-default build option). The `UPDATE` and the `RETURNING` read-back
//! are one atomic statement, so two callers racing with the same `node`
//! value can never both claim the same row, nor orphan a row claimed by
//! neither.
//! There is a 1:1 relationship between an alert and at most one live
//! workload row.

use crate::model::ModelManager;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadItem {
    pub id: i64,
    pub alert_id: i64,
    pub node: Option<String>,
}

fn row_to_item(row: &libsql::Row) -> Result<WorkloadItem> {
    Ok(WorkloadItem {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        node: row.get(2)?,
    })
}

pub struct WorkloadBmc;

impl WorkloadBmc {
    /// Producer side: makes `alert_id` visible to workers, unclaimed.
    pub async fn enqueue(mm: &ModelManager, alert_id: i64) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO workload (alert_id, node) VALUES (?1, NULL)",
                libsql::params![alert_id],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn get_by_alert(mm: &ModelManager, alert_id: i64) -> Result<Option<WorkloadItem>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, alert_id, node FROM workload WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Consumer side: claims the oldest unclaimed workload row for `node`,
    /// returning it, or `None` if the queue is empty. The claim and the
    /// read-back happen in one `UPDATE ... RETURNING` statement so two
    /// concurrent callers (even ones sharing the same `node`) can never
    /// both match the same subquery result.
    pub async fn claim_next(mm: &ModelManager, node: &str) -> Result<Option<WorkloadItem>> {
        let mut rows = mm
            .db()
            .query(
                "UPDATE workload SET node = ?1 \
                 WHERE id = (SELECT id FROM workload WHERE node IS NULL ORDER BY id LIMIT 1) \
                 RETURNING id, alert_id, node",
                libsql::params![node],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Removes the workload row once an alert's analysis has completed,
    /// flipping `AlertBmc::status` to `Completed`.
    pub async fn complete(mm: &ModelManager, alert_id: i64) -> Result<()> {
        mm.db()
            .execute(
                "DELETE FROM workload WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
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
        let db = new_db_pool_at(dir.path().join("workload_test.db")).await.unwrap();
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
    async fn test_enqueue_then_claim() {
        let mm = test_mm().await;
        let alert_id = seed_alert(&mm).await;
        WorkloadBmc::enqueue(&mm, alert_id).await.unwrap();

        let item = WorkloadBmc::get_by_alert(&mm, alert_id).await.unwrap().unwrap();
        assert!(item.node.is_none());

        let claimed = WorkloadBmc::claim_next(&mm, "worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.alert_id, alert_id);
        assert_eq!(claimed.node.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_claim_next_is_fifo_and_empties_out() {
        let mm = test_mm().await;
        let a1 = seed_alert(&mm).await;
        let a2 = seed_alert(&mm).await;
        WorkloadBmc::enqueue(&mm, a1).await.unwrap();
        WorkloadBmc::enqueue(&mm, a2).await.unwrap();

        let first = WorkloadBmc::claim_next(&mm, "worker-1").await.unwrap().unwrap();
        assert_eq!(first.alert_id, a1);
        let second = WorkloadBmc::claim_next(&mm, "worker-1").await.unwrap().unwrap();
        assert_eq!(second.alert_id, a2);
        assert!(WorkloadBmc::claim_next(&mm, "worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_removes_row() {
        let mm = test_mm().await;
        let alert_id = seed_alert(&mm).await;
        WorkloadBmc::enqueue(&mm, alert_id).await.unwrap();
        WorkloadBmc::complete(&mm, alert_id).await.unwrap();
        assert!(WorkloadBmc::get_by_alert(&mm, alert_id).await.unwrap().is_none());
    }

    /// Several callers sharing the same `node` race `claim_next` against
    /// the same queue. The `UPDATE ... RETURNING` statement must still
    /// hand each row to exactly one caller: no row claimed twice, no row
    /// left unclaimed.
    #[tokio::test]
    async fn test_concurrent_claim_next_same_node_never_double_claims() {
        let mm = test_mm().await;
        let mut alert_ids = Vec::new();
        for _ in 0..10 {
            let alert_id = seed_alert(&mm).await;
            WorkloadBmc::enqueue(&mm, alert_id).await.unwrap();
            alert_ids.push(alert_id);
        }

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let mm = mm.clone();
            tasks.push(tokio::spawn(async move {
                WorkloadBmc::claim_next(&mm, "worker-shared").await.unwrap()
            }));
        }

        let mut claimed = Vec::new();
        for task in tasks {
            if let Some(item) = task.await.unwrap() {
                claimed.push(item.alert_id);
            }
        }

        claimed.sort_unstable();
        let mut expected = alert_ids;
        expected.sort_unstable();
        assert_eq!(claimed, expected, "every row must be claimed exactly once, none duplicated or dropped");
    }
}
