//! In-memory analysis tree attached to an alert.
//!
//! `RootAnalysis` is the aggregate an ingestor builds up while processing
//! a capture (tags, observables, profile points, detection points) before
//! handing it to [`crate::model::alert::AlertBmc::sync`] for persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single file evidence reference with its ingestion directives
/// (`ORIGINAL_EMAIL`, `NO_SCAN`, `ARCHIVE`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObservable {
    pub relative_path: String,
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootAnalysis {
    pub alert_type: String,
    pub description: String,
    /// Set by an ingestor that knows which company an alert belongs to;
    /// `AlertBmc::sync` resolves this to `company_id` when the alert's
    /// `company_id` column is still unset.
    pub company_name: Option<String>,
    pub tags: Vec<String>,
    /// `(type, value)` pairs.
    pub observables: Vec<(String, String)>,
    pub profile_points: Vec<String>,
    /// Opaque per-module detection markers; `detection_count` is their
    /// cardinality.
    pub detection_points: Vec<serde_json::Value>,
    pub files: Vec<FileObservable>,
    /// Arbitrary additional analysis detail, merged into the alert's JSON
    /// snapshot. V2 legacy keys live here under their original names so
    /// [`crate::engine::hooks::backfill_v2_details`] can copy from the
    /// canonical keys without clobbering anything the module already set.
    pub details: HashMap<String, serde_json::Value>,
}

impl RootAnalysis {
    pub fn new(alert_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            alert_type: alert_type.into(),
            description: description.into(),
            company_name: None,
            tags: Vec::new(),
            observables: Vec::new(),
            profile_points: Vec::new(),
            detection_points: Vec::new(),
            files: Vec::new(),
            details: HashMap::new(),
        }
    }

    pub fn add_file_observable(&mut self, relative_path: impl Into<String>, directives: &[&str]) {
        self.files.push(FileObservable {
            relative_path: relative_path.into(),
            directives: directives.iter().map(|s| s.to_string()).collect(),
        });
        self.observables
            .push(("file_path".to_string(), self.files.last().expect("just pushed").relative_path.clone()));
    }

    /// The single file observable carrying `directive`, if exactly one
    /// exists; used to locate `ORIGINAL_EMAIL` in the mailbox pipeline.
    pub fn find_file_with_directive(&self, directive: &str) -> Option<&FileObservable> {
        self.files
            .iter()
            .find(|f| f.directives.iter().any(|d| d == directive))
    }
}
