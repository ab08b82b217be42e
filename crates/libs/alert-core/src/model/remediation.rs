//! Remediation: a logged remediation action taken against an alert (spec
//! §3, "curation entities layered on top of alerts").

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    pub id: i64,
    pub alert_id: i64,
    pub action: String,
    pub user_id: Option<i64>,
    pub successful: Option<bool>,
    pub create_date: String,
}

fn row_to_remediation(row: &libsql::Row) -> Result<Remediation> {
    Ok(Remediation {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        action: row.get(2)?,
        user_id: row.get(3)?,
        successful: row.get::<Option<i64>>(4)?.map(|v| v != 0),
        create_date: row.get(5)?,
    })
}

pub struct RemediationBmc;

impl RemediationBmc {
    pub async fn create(
        mm: &ModelManager,
        alert_id: i64,
        action: &str,
        user_id: Option<i64>,
    ) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO remediation (alert_id, action, user_id) VALUES (?1, ?2, ?3)",
                libsql::params![alert_id, action, user_id],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn mark_outcome(mm: &ModelManager, id: i64, successful: bool) -> Result<()> {
        mm.db()
            .execute(
                "UPDATE remediation SET successful = ?1 WHERE id = ?2",
                libsql::params![successful as i64, id],
            )
            .await?;
        Ok(())
    }

    pub async fn list_for_alert(mm: &ModelManager, alert_id: i64) -> Result<Vec<Remediation>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, alert_id, action, user_id, successful, create_date \
                 FROM remediation WHERE alert_id = ?1 ORDER BY id ASC",
                libsql::params![alert_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_remediation(&row)?);
        }
        Ok(out)
    }

    pub async fn get(mm: &ModelManager, id: i64) -> Result<Remediation> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, alert_id, action, user_id, successful, create_date \
                 FROM remediation WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        let row = rows.next().await?.ok_or(Error::NotFound)?;
        row_to_remediation(&row)
    }
}
