//! Analysis-pipeline hooks consumed by the worker after an analysis
//! module runs. The analysis modules themselves are external
//! collaborators, out of scope here; this module only implements
//! the dispatch/back-fill/cleanup contracts around them, plus the
//! `should_alert`/whitelist checks as a trait the caller supplies.

use crate::engine::root_analysis::RootAnalysis;
use crate::model::alert::AlertBmc;
use crate::model::ModelManager;
use crate::store::distributed_lock::DistributedAlertLock;
use crate::Result;
use serde_json::Value;

/// `should_alert`/whitelist contract. Analysis modules themselves are out
/// of scope; a worker supplies its own implementation wired to
/// whatever whitelist/heuristic modules it loads. [`NeverDrop`] is a
/// no-op implementation for pipelines with no such checks configured.
pub trait AnalysisPipelineHooks: Send + Sync {
    /// True if this alert's evidence matches a configured whitelist entry
    /// and should be silently dropped.
    fn is_whitelisted(&self, root: &RootAnalysis) -> bool;

    /// False if, despite detections, the analysis modules decided this
    /// isn't worth alerting an analyst about.
    fn should_alert(&self, root: &RootAnalysis) -> bool;
}

/// Default hook set: nothing is whitelisted, everything alerts.
pub struct NeverDrop;

impl AnalysisPipelineHooks for NeverDrop {
    fn is_whitelisted(&self, _root: &RootAnalysis) -> bool {
        false
    }

    fn should_alert(&self, _root: &RootAnalysis) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Whitelisted,
    ShouldAlertFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAnalysisOutcome {
    Submitted,
    Dropped(DropReason),
}

/// `post_analysis(root)`: dispatches by `alert_type`.
/// `mailbox` alerts get the whitelist/should_alert gate and an
/// opportunistic Office365 re-target; every other alert type takes the
/// brotex path (legacy v2 detail back-fill, no gate).
pub async fn post_analysis(
    mm: &ModelManager,
    alert_id: i64,
    root: &mut RootAnalysis,
    hooks: &dyn AnalysisPipelineHooks,
    lock: Option<&mut DistributedAlertLock>,
) -> Result<PostAnalysisOutcome> {
    if root.alert_type == "mailbox" {
        post_mailbox_analysis(mm, alert_id, root, hooks, lock).await
    } else {
        post_brotex_analysis(mm, alert_id, root, lock).await
    }
}

/// Builds a human description from `(decoded subject | subject | "(no
/// subject)")` plus from/to.
fn mailbox_description(root: &RootAnalysis) -> String {
    let subject = root
        .details
        .get("decoded_subject")
        .and_then(Value::as_str)
        .or_else(|| root.details.get("subject").and_then(Value::as_str))
        .unwrap_or("(no subject)");

    let from = root.details.get("mail_from").and_then(Value::as_str).unwrap_or("?");
    let to = root.details.get("rcpt_to").and_then(Value::as_str).unwrap_or("?");

    format!("{subject} (from {from} to {to})")
}

async fn post_mailbox_analysis(
    mm: &ModelManager,
    alert_id: i64,
    root: &mut RootAnalysis,
    hooks: &dyn AnalysisPipelineHooks,
    lock: Option<&mut DistributedAlertLock>,
) -> Result<PostAnalysisOutcome> {
    retarget_office365_report(root);

    if hooks.is_whitelisted(root) {
        return Ok(PostAnalysisOutcome::Dropped(DropReason::Whitelisted));
    }
    if !hooks.should_alert(root) {
        return Ok(PostAnalysisOutcome::Dropped(DropReason::ShouldAlertFalse));
    }

    root.description = mailbox_description(root);
    AlertBmc::sync(mm, alert_id, root, lock).await?;
    Ok(PostAnalysisOutcome::Submitted)
}

async fn post_brotex_analysis(
    mm: &ModelManager,
    alert_id: i64,
    root: &mut RootAnalysis,
    lock: Option<&mut DistributedAlertLock>,
) -> Result<PostAnalysisOutcome> {
    backfill_v2_details(root);
    AlertBmc::sync(mm, alert_id, root, lock).await?;
    Ok(PostAnalysisOutcome::Submitted)
}

/// Legacy v2 detail keys the brotex UI/export path still reads, back-
/// filled from their canonical v3+ names when absent.
const V2_LEGACY_DETAIL_KEYS: &[(&str, &str)] = &[
    ("v2_mail_from", "mail_from"),
    ("v2_rcpt_to", "rcpt_to"),
    ("v2_subject", "subject"),
];

/// Copies canonical detail keys into their legacy v2 names whenever the
/// legacy key isn't already set, without clobbering anything an analysis
/// module already wrote under that name.
pub fn backfill_v2_details(root: &mut RootAnalysis) {
    for (legacy_key, canonical_key) in V2_LEGACY_DETAIL_KEYS {
        if root.details.contains_key(*legacy_key) {
            continue;
        }
        if let Some(value) = root.details.get(*canonical_key).cloned() {
            root.details.insert((*legacy_key).to_string(), value);
        }
    }
}

/// Opportunistic re-targeting: if an upstream Office365BlockAnalysis
/// resolved a decrypted report file (recorded under
/// `office365_block_report_file`), retype the alert to `o365` and
/// replace the original file reference with the reported file (spec
/// §C.7). Returns whether a retarget happened.
pub fn retarget_office365_report(root: &mut RootAnalysis) -> bool {
    let Some(report_file) = root
        .details
        .get("office365_block_report_file")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return false;
    };

    root.alert_type = "o365".to_string();
    root.description = format!("Office365 Blocked Email Report - {report_file}");

    if let Some(original) = root.files.iter_mut().find(|f| f.directives.iter().any(|d| d == "ORIGINAL_EMAIL")) {
        original.relative_path = report_file;
    }
    true
}

/// `cleanup(work_item)`: if the analysis wasn't delayed and
/// the worker didn't request retention, delete the alert's storage
/// directory.
pub struct CleanupContext {
    pub storage_dir: String,
    pub delayed: bool,
    pub retain: bool,
}

pub async fn cleanup(ctx: &CleanupContext) -> Result<()> {
    if !ctx.delayed && !ctx.retain {
        let _ = tokio::fs::remove_dir_all(&ctx.storage_dir).await;
    }
    Ok(())
}
