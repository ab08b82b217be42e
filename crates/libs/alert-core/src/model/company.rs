//! Company: a curation entity an alert may be attributed to. Unique by
//! `name`; resolved lazily from `AlertForCreate::company_name`.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

pub struct CompanyBmc;

impl CompanyBmc {
    pub async fn get(mm: &ModelManager, id: i64) -> Result<Company> {
        let mut rows = mm
            .db()
            .query("SELECT id, name FROM company WHERE id = ?1", libsql::params![id])
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::CompanyNotFound(id.to_string()))?;
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    pub async fn get_by_name(mm: &ModelManager, name: &str) -> Result<Option<Company>> {
        let mut rows = mm
            .db()
            .query("SELECT id, name FROM company WHERE name = ?1", libsql::params![name])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Company {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    /// `INSERT OR IGNORE` then re-select, the same insert-ignore-then-read
    /// pattern the mapping synchronizer uses for tags/observables.
    pub async fn get_or_create(mm: &ModelManager, name: &str) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO company (name) VALUES (?1)",
                libsql::params![name],
            )
            .await?;
        match Self::get_by_name(mm, name).await? {
            Some(company) => Ok(company.id),
            None => Err(Error::CompanyNotFound(name.to_string())),
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
        let db = new_db_pool_at(dir.path().join("company_test.db")).await.unwrap();
        ModelManager::new_for_test(db, Arc::new(AppConfig::default()))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let mm = test_mm().await;
        let id1 = CompanyBmc::get_or_create(&mm, "acme").await.unwrap();
        let id2 = CompanyBmc::get_or_create(&mm, "acme").await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_get_unknown_company_errors() {
        let mm = test_mm().await;
        let err = CompanyBmc::get(&mm, 999).await.unwrap_err();
        assert!(matches!(err, Error::CompanyNotFound(_)));
    }
}
