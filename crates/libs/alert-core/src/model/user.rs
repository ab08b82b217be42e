//! Users: the curation entity `disposition_user_id`, `owner_id`, and
//! `removal_user_id` reference. Unique by `username` and `email`.

use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub omniscience: bool,
}

#[derive(Debug, Clone)]
pub struct UserForCreate {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub omniscience: bool,
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        omniscience: row.get::<i64>(3)? != 0,
    })
}

pub struct UserBmc;

impl UserBmc {
    pub async fn create(mm: &ModelManager, data: UserForCreate) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO users (username, email, password_hash, omniscience) \
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![data.username, data.email, data.password_hash, data.omniscience as i64],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn get(mm: &ModelManager, id: i64) -> Result<User> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, username, email, omniscience FROM users WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        let row = rows.next().await?.ok_or(Error::NotFound)?;
        row_to_user(&row)
    }

    pub async fn get_by_username(mm: &ModelManager, username: &str) -> Result<Option<User>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, username, email, omniscience FROM users WHERE username = ?1",
                libsql::params![username],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
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
        let db = new_db_pool_at(dir.path().join("user_test.db")).await.unwrap();
        ModelManager::new_for_test(db, Arc::new(AppConfig::default()))
    }

    fn sample() -> UserForCreate {
        UserForCreate {
            username: "analyst1".into(),
            email: "analyst1@example.com".into(),
            password_hash: "hashed".into(),
            omniscience: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let mm = test_mm().await;
        let id = UserBmc::create(&mm, sample()).await.unwrap();
        let user = UserBmc::get(&mm, id).await.unwrap();
        assert_eq!(user.username, "analyst1");
        assert!(!user.omniscience);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let mm = test_mm().await;
        UserBmc::create(&mm, sample()).await.unwrap();
        let mut dup = sample();
        dup.email = "other@example.com".into();
        assert!(UserBmc::create(&mm, dup).await.is_err());
    }
}
