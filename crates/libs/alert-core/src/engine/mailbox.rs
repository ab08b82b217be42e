//! Single-file mailbox ingestion path.
//!
//! Unlike [`crate::engine::bro_smtp`], which reassembles many e-mails out
//! of one capture file, the mailbox ingestor submits exactly one already-
//! complete RFC822 file as one alert.

use crate::engine::root_analysis::RootAnalysis;
use crate::model::alert::{AlertBmc, AlertForCreate};
use crate::model::workload::WorkloadBmc;
use crate::model::ModelManager;
use crate::Result;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Evidence directives stamped on the original e-mail file by both
/// ingestion paths: never re-scan it, and preserve it
/// verbatim in the archive.
const EMAIL_DIRECTIVES: &[&str] = &["ORIGINAL_EMAIL", "NO_SCAN", "ARCHIVE"];

pub struct MailboxIngestor {
    mm: ModelManager,
    collection_dir: PathBuf,
}

impl MailboxIngestor {
    pub fn new(mm: ModelManager) -> Self {
        let collection_dir = PathBuf::from(&mm.app_config().engine.collection_dir);
        Self { mm, collection_dir }
    }

    /// Moves `source_path` into a fresh `storage_dir/email.rfc822`,
    /// chmods it `0644`, tags it with the three ingestion directives,
    /// creates the alert, and enqueues it on the workload queue.
    ///
    /// `tool_instance` identifies the originating mailbox/feed (e.g. an
    /// account address); `event_time` defaults to now if the caller has
    /// no better signal (e.g. a message `Date:` header already parsed
    /// upstream).
    pub async fn ingest(
        &self,
        source_path: &Path,
        tool_instance: &str,
        event_time: NaiveDateTime,
    ) -> Result<i64> {
        let storage_dir = self.collection_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&storage_dir).await?;
        let rfc822_path = storage_dir.join("email.rfc822");

        tokio::fs::rename(source_path, &rfc822_path).await?;
        Self::chmod_0644(&rfc822_path).await?;

        let mut root = RootAnalysis::new("mailbox", "mailbox submission");
        root.add_file_observable("email.rfc822", EMAIL_DIRECTIVES);

        let data = AlertForCreate {
            uuid: None,
            storage_dir: storage_dir.to_string_lossy().to_string(),
            location: self.mm.node().to_string(),
            company_name: None,
            tool: "mailbox".to_string(),
            tool_instance: tool_instance.to_string(),
            alert_type: root.alert_type.clone(),
            description: root.description.clone(),
            event_time,
        };

        let alert_id = AlertBmc::insert(&self.mm, data).await?;
        AlertBmc::sync(&self.mm, alert_id, &root, None).await?;
        WorkloadBmc::enqueue(&self.mm, alert_id).await?;
        Ok(alert_id)
    }

    #[cfg(unix)]
    async fn chmod_0644(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o644);
        tokio::fs::set_permissions(path, perms).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn chmod_0644(_path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use alert_common::config::AppConfig;
    use std::sync::Arc;

    async fn test_mm(root_dir: &Path) -> ModelManager {
        let db = crate::store::new_db_pool_at(root_dir.join("mailbox_test.db")).await.unwrap();
        let mut config = AppConfig::default();
        config.engine.collection_dir = root_dir.join("alerts").to_string_lossy().to_string();
        ModelManager::new_for_test(db, Arc::new(config))
    }

    #[tokio::test]
    async fn test_ingest_moves_file_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let mm = test_mm(dir.path()).await;

        let source = dir.path().join("incoming.eml");
        tokio::fs::write(&source, "Subject: hi\n\nbody\n").await.unwrap();

        let ingestor = MailboxIngestor::new(mm.clone());
        let alert_id = ingestor
            .ingest(&source, "inbox@example.com", chrono::Utc::now().naive_utc())
            .await
            .unwrap();

        assert!(!source.exists());
        let alert = AlertBmc::get(&mm, alert_id).await.unwrap();
        let rfc822 = PathBuf::from(&alert.storage_dir).join("email.rfc822");
        let contents = tokio::fs::read_to_string(&rfc822).await.unwrap();
        assert_eq!(contents, "Subject: hi\n\nbody\n");

        let workload = WorkloadBmc::get_by_alert(&mm, alert_id).await.unwrap();
        assert!(workload.is_some());
    }
}
