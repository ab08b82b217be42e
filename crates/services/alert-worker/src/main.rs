use alert_core::engine::bro_smtp::BroSmtpConsumer;
use alert_core::engine::hooks::{self, AnalysisPipelineHooks, NeverDrop};
use alert_core::engine::mailbox::MailboxIngestor;
use alert_core::engine::root_analysis::RootAnalysis;
use alert_core::model::alert::AlertBmc;
use alert_core::model::delayed_analysis::DelayedAnalysisBmc;
use alert_core::model::workload::WorkloadBmc;
use alert_core::model::ModelManager;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply migrations and exit.
    Migrate,
    /// Run the worker loop and the bro-SMTP consumer until interrupted.
    Serve {
        /// Don't start the bro-SMTP directory watcher, only the workload worker.
        #[arg(long, default_value_t = false)]
        no_bro_smtp: bool,
        /// Seconds to sleep between workload queue polls when empty.
        #[arg(long, default_value_t = 2)]
        poll_interval_secs: u64,
    },
    /// Ingest a single already-complete RFC822 file as one alert.
    Mailbox {
        /// Path to the RFC822 file to ingest.
        path: String,
        /// Identifies the originating mailbox/feed (e.g. an account address).
        #[arg(long)]
        tool_instance: String,
    },
}

async fn model_manager() -> Result<ModelManager> {
    let config = alert_common::AppConfig::load().unwrap_or_default();
    Ok(ModelManager::new(Arc::new(config)).await?)
}

/// Re-derives a [`RootAnalysis`] for an alert already on disk, from its
/// current tags, description, and previously-saved JSON snapshot, for a
/// worker tick that has no external analysis module wired in (those are
/// out of scope here; see the `AnalysisPipelineHooks` trait for where one
/// would plug in).
async fn load_root_for_resync(mm: &ModelManager, alert_id: i64) -> Result<RootAnalysis> {
    let alert = AlertBmc::get(mm, alert_id).await?;
    let tags = AlertBmc::sorted_tags(mm, alert_id).await?;
    let mut root = RootAnalysis::new(alert.alert_type.clone(), alert.description.clone());
    root.tags = tags;
    if let Some(snapshot) = AlertBmc::load_json_snapshot(&alert).await? {
        AlertBmc::merge_json_snapshot(&mut root, &snapshot);
    }
    Ok(root)
}

/// One iteration of the worker loop: claim a workload item, lock its
/// alert, run the pipeline hooks, clean up and mark complete.
async fn process_one(mm: &ModelManager, hooks_impl: &dyn AnalysisPipelineHooks) -> Result<bool> {
    let Some(item) = WorkloadBmc::claim_next(mm, mm.node()).await? else {
        return Ok(false);
    };

    let Some(mut lock) = AlertBmc::acquire_lock(mm, item.alert_id).await? else {
        tracing::warn!(alert_id = item.alert_id, "could not acquire lock, leaving assigned");
        return Ok(true);
    };

    let mut root = load_root_for_resync(mm, item.alert_id).await?;
    let outcome = hooks::post_analysis(mm, item.alert_id, &mut root, hooks_impl, Some(&mut lock)).await?;

    match outcome {
        hooks::PostAnalysisOutcome::Submitted => {
            tracing::info!(alert_id = item.alert_id, "alert submitted");
        }
        hooks::PostAnalysisOutcome::Dropped(reason) => {
            // The Submitted path releases the lock via AlertBmc::sync;
            // a drop short-circuits before sync is ever called, so the
            // lock has to be released here instead.
            if lock.has_current_lock() {
                lock.unlock().await?;
            }
            tracing::info!(alert_id = item.alert_id, ?reason, "alert dropped");
        }
    }

    let alert = AlertBmc::get(mm, item.alert_id).await?;
    let delayed = DelayedAnalysisBmc::is_pending(mm, item.alert_id).await?;
    hooks::cleanup(&hooks::CleanupContext {
        storage_dir: alert.storage_dir,
        delayed,
        retain: false,
    })
    .await?;

    if !delayed {
        WorkloadBmc::complete(mm, item.alert_id).await?;
    }

    Ok(true)
}

async fn run_worker_loop(mm: ModelManager, shutdown: Arc<AtomicBool>, poll_interval: Duration) -> Result<()> {
    while !shutdown.load(Ordering::Relaxed) {
        match process_one(&mm, &NeverDrop).await {
            Ok(true) => continue,
            Ok(false) => tokio::time::sleep(poll_interval).await,
            Err(e) => {
                tracing::warn!(error = %e, "worker tick failed, continuing");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    alert_common::tracing::setup_tracing(false);

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            let _ = model_manager().await?;
            println!("Migrations completed successfully.");
        }
        Commands::Serve {
            no_bro_smtp,
            poll_interval_secs,
        } => {
            let mm = model_manager().await?;
            let shutdown = Arc::new(AtomicBool::new(false));

            let bro_smtp_task = if no_bro_smtp {
                None
            } else {
                let consumer = BroSmtpConsumer::new(mm.clone());
                let bro_shutdown = Arc::clone(&shutdown);
                Some(tokio::spawn(async move { consumer.run(bro_shutdown).await }))
            };

            let shutdown_for_signal = Arc::clone(&shutdown);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                    shutdown_for_signal.store(true, Ordering::Relaxed);
                }
            });

            tracing::info!(node = mm.node(), "worker loop starting");
            run_worker_loop(mm, shutdown, Duration::from_secs(poll_interval_secs)).await?;

            if let Some(task) = bro_smtp_task {
                task.await??;
            }
        }
        Commands::Mailbox { path, tool_instance } => {
            let mm = model_manager().await?;
            let ingestor = MailboxIngestor::new(mm);
            let alert_id = ingestor
                .ingest(std::path::Path::new(&path), &tool_instance, chrono::Utc::now().naive_utc())
                .await?;
            println!("Ingested {} as alert {}", path, alert_id);
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use alert_core::store::new_db_pool_at;

    async fn test_mm(root_dir: &std::path::Path) -> ModelManager {
        let db = new_db_pool_at(root_dir.join("worker_test.db")).await.unwrap();
        let mut config = alert_common::AppConfig::default();
        config.engine.collection_dir = root_dir.join("alerts").to_string_lossy().to_string();
        ModelManager::new_for_test(db, Arc::new(config))
    }

    #[tokio::test]
    async fn test_process_one_returns_false_on_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mm = test_mm(dir.path()).await;
        assert!(!process_one(&mm, &NeverDrop).await.unwrap());
    }

    #[tokio::test]
    async fn test_process_one_completes_a_mailbox_alert() {
        let dir = tempfile::tempdir().unwrap();
        let mm = test_mm(dir.path()).await;

        let source = dir.path().join("incoming.eml");
        tokio::fs::write(&source, "Subject: hi\n\nbody\n").await.unwrap();

        let ingestor = MailboxIngestor::new(mm.clone());
        let alert_id = ingestor
            .ingest(&source, "inbox@example.com", chrono::Utc::now().naive_utc())
            .await
            .unwrap();

        assert!(process_one(&mm, &NeverDrop).await.unwrap());
        assert!(WorkloadBmc::get_by_alert(&mm, alert_id).await.unwrap().is_none());

        let alert = AlertBmc::get(&mm, alert_id).await.unwrap();
        assert!(!std::path::Path::new(&alert.storage_dir).exists());
    }

    struct AlwaysWhitelist;
    impl AnalysisPipelineHooks for AlwaysWhitelist {
        fn is_whitelisted(&self, _root: &RootAnalysis) -> bool {
            true
        }
        fn should_alert(&self, _root: &RootAnalysis) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_process_one_releases_lock_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mm = test_mm(dir.path()).await;

        let source = dir.path().join("incoming.eml");
        tokio::fs::write(&source, "Subject: promo\n\nbody\n").await.unwrap();

        let ingestor = MailboxIngestor::new(mm.clone());
        let alert_id = ingestor
            .ingest(&source, "inbox@example.com", chrono::Utc::now().naive_utc())
            .await
            .unwrap();

        assert!(process_one(&mm, &AlwaysWhitelist).await.unwrap());

        // Dropped alerts still drain the queue and release the lock.
        assert!(WorkloadBmc::get_by_alert(&mm, alert_id).await.unwrap().is_none());
        assert!(AlertBmc::acquire_lock(&mm, alert_id).await.unwrap().is_some());
    }
}
