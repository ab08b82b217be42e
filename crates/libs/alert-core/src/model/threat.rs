//! Threat: a named threat classification (`type` e.g. `actor`, `family`)
//! linked to malware via `malware_threat_mapping`.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub id: i64,
    pub name: String,
    pub threat_type: String,
}

pub struct ThreatBmc;

impl ThreatBmc {
    pub async fn create(mm: &ModelManager, name: &str, threat_type: &str) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO threat (name, type) VALUES (?1, ?2)",
                libsql::params![name, threat_type],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn get(mm: &ModelManager, id: i64) -> Result<Threat> {
        let mut rows = mm
            .db()
            .query("SELECT id, name, type FROM threat WHERE id = ?1", libsql::params![id])
            .await?;
        let row = rows.next().await?.ok_or(Error::NotFound)?;
        Ok(Threat {
            id: row.get(0)?,
            name: row.get(1)?,
            threat_type: row.get(2)?,
        })
    }
}
