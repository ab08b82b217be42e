// Allow expect in this module: regex patterns are compile-time verified.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref TAG_NAME_RE: Regex = Regex::new(r"^\S{1,255}$").expect("valid regex pattern");
    static ref LOCK_TIMEOUT_RE: Regex =
        Regex::new(r"^\d{1,3}:\d{2}$").expect("valid regex pattern");
}

/// The disposition values an alert may carry, in the rank order used for
/// event roll-up (see [`crate::model::event::disposition_rank`]).
pub const VALID_DISPOSITIONS: &[&str] = &[
    "IGNORE",
    "FALSE_POSITIVE",
    "UNKNOWN",
    "REVIEWED",
    "GRAYWARE",
    "POLICY_VIOLATION",
    "RECONNAISSANCE",
    "WEAPONIZATION",
    "DELIVERY",
    "EXPLOITATION",
    "INSTALLATION",
    "COMMAND_AND_CONTROL",
    "EXFIL",
    "DAMAGE",
];

/// Validation error with actionable suggestion.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ValidationError {
    #[error("Invalid tag name: {provided}")]
    InvalidTagName { provided: String },

    #[error("Invalid disposition: {provided}, expected one of {valid:?}")]
    InvalidDisposition {
        provided: String,
        valid: Vec<String>,
    },

    #[error("storage_dir must be a non-empty absolute path, got: {provided}")]
    InvalidStorageDir { provided: String },

    #[error("lock_timeout must match MM:SS, got: {provided}")]
    InvalidLockTimeout { provided: String },
}

impl ValidationError {
    pub fn context(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Validates a tag/observable-dictionary name: non-empty, no whitespace,
/// bounded length (matches the `tags.name UNIQUE` column width).
pub fn validate_tag_name(name: &str) -> Result<(), ValidationError> {
    if TAG_NAME_RE.is_match(name) {
        return Ok(());
    }
    Err(ValidationError::InvalidTagName {
        provided: name.to_string(),
    })
}

/// Validates that `disposition` is one of the ranked values in
/// [`VALID_DISPOSITIONS`].
pub fn validate_disposition(disposition: &str) -> Result<(), ValidationError> {
    if VALID_DISPOSITIONS.contains(&disposition) {
        return Ok(());
    }
    Err(ValidationError::InvalidDisposition {
        provided: disposition.to_string(),
        valid: VALID_DISPOSITIONS.iter().map(|s| s.to_string()).collect(),
    })
}

/// Validates `storage_dir`: must be non-empty and absolute. The uniqueness
/// invariant itself is enforced by the database column constraint.
pub fn validate_storage_dir(path: &str) -> Result<(), ValidationError> {
    if !path.is_empty() && std::path::Path::new(path).is_absolute() {
        return Ok(());
    }
    Err(ValidationError::InvalidStorageDir {
        provided: path.to_string(),
    })
}

/// Validates the `global.lock_timeout` configuration value's shape
/// (`MM:SS`). Parsing into seconds is done by
/// [`alert_common::config::parse_lock_timeout`].
pub fn validate_lock_timeout(raw: &str) -> Result<(), ValidationError> {
    if LOCK_TIMEOUT_RE.is_match(raw) {
        return Ok(());
    }
    Err(ValidationError::InvalidLockTimeout {
        provided: raw.to_string(),
    })
}
