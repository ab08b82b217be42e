//! Shared fixtures for the integration test suite: an isolated
//! per-test database plus a seeded alert row.

#![allow(dead_code)]

use alert_common::config::AppConfig;
use alert_core::model::alert::{AlertBmc, AlertForCreate};
use alert_core::model::ModelManager;
use alert_core::store::new_db_pool_at;
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Builds a `ModelManager` over a fresh on-disk database under a temp
/// directory, with `engine.collection_dir` pointed at the same directory
/// so ingestion paths have somewhere to write. The `TempDir` must be kept
/// alive for the caller's whole test; it is returned alongside the manager.
pub async fn test_mm() -> (ModelManager, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let db = new_db_pool_at(dir.path().join("alert_core.db"))
        .await
        .expect("open test db");
    let mut config = AppConfig::default();
    config.engine.collection_dir = dir.path().join("alerts").to_string_lossy().to_string();
    (ModelManager::new_for_test(db, Arc::new(config)), dir)
}

/// Inserts a bare alert row with no tags/observables and returns its id.
pub async fn seed_alert(mm: &ModelManager) -> i64 {
    AlertBmc::insert(
        mm,
        AlertForCreate {
            uuid: None,
            storage_dir: format!("/tmp/alert-core-it-{}", Uuid::new_v4()),
            location: mm.node().to_string(),
            company_name: None,
            tool: "test".into(),
            tool_instance: "test".into(),
            alert_type: "unittest".into(),
            description: "desc".into(),
            event_time: Utc::now().naive_utc(),
        },
    )
    .await
    .expect("insert alert")
}
