//! Error types for alert-core operations.
//!
//! Errors are categorized into:
//!
//! - **External errors**: wrapped errors from dependencies (libsql, serde_json, io, chrono)
//! - **Internal errors**: generic errors for common failure modes
//! - **Model-specific errors**: entity-specific not-found errors
//!
//! # Example
//!
//! ```
//! use alert_core::error::{Error, Result};
//!
//! fn find_tag(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(Error::InvalidInput("tag name cannot be empty".to_string()));
//!     }
//!     Err(Error::TagNotFound(name.to_string()))
//! }
//!
//! match find_tag("") {
//!     Ok(_) => println!("Found"),
//!     Err(Error::InvalidInput(msg)) => println!("Invalid: {}", msg),
//!     Err(Error::TagNotFound(name)) => println!("Not found: {}", name),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```

use strum_macros::AsRefStr;
use thiserror::Error;

/// The error type for alert-core operations.
///
/// Implements [`std::error::Error`] via `thiserror` and provides `From`
/// implementations for automatic conversion from underlying error types.
#[derive(Debug, Error, AsRefStr)]
pub enum Error {
    // -- External errors from dependencies
    /// Database error from libsql.
    #[error("Libsql Error: {0}")]
    Libsql(#[from] libsql::Error),

    /// JSON serialization/deserialization error.
    #[error("Serde JSON Error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Standard I/O error.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// Timestamp parsing error.
    #[error("Chrono parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    // -- Internal errors for common failure modes
    /// Generic entity not found error.
    #[error("Entity not found")]
    NotFound,

    /// Input validation error.
    ///
    /// # Example
    ///
    /// ```
    /// use alert_core::Error;
    ///
    /// let err = Error::InvalidInput("storage_dir already exists".to_string());
    /// assert!(err.to_string().contains("storage_dir"));
    /// ```
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // -- Model-specific not-found errors
    /// Alert not found by id.
    #[error("Alert not found: {0}")]
    AlertNotFound(i64),

    /// Tag not found by name.
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Observable not found by (type, value).
    #[error("Observable not found: {0}:{1}")]
    ObservableNotFound(String, String),

    /// Profile point not found by description.
    #[error("Profile point not found: {0}")]
    ProfilePointNotFound(String),

    /// Event not found by id.
    #[error("Event not found: {0}")]
    EventNotFound(i64),

    /// Company not found by name.
    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    /// Workload item not found by alert id.
    #[error("Workload item not found for alert: {0}")]
    WorkloadNotFound(i64),

    /// Lock acquisition/refresh/unlock lost the race: the caller held a
    /// stale token or the row was stolen by another worker. Distinct from
    /// a database error — this is the expected "lost race" outcome and
    /// callers should treat it as a boolean false, not an exception. Kept
    /// as a variant (rather than a bare bool everywhere) so it can
    /// propagate through `?` in call chains that only see success.
    #[error("Lock lost or not held for alert {alert_id}")]
    LockLost { alert_id: i64 },

    /// Storage directory collision: `storage_dir` already claimed by
    /// another alert.
    #[error("Storage directory collision: {0}")]
    StorageDirCollision(String),

    /// Malformed bro-SMTP capture file.
    #[error("Malformed capture file {path}: {reason}")]
    MalformedCapture { path: String, reason: String },

    /// Disposition transition would not be monotonic per the rank table.
    #[error("Invalid disposition transition: {from} -> {to}")]
    InvalidDispositionTransition { from: String, to: String },

    /// Structured validation error with actionable suggestion.
    #[error("Validation error: {0}")]
    Validation(#[from] crate::utils::validation::ValidationError),
}

/// A specialized [`Result`] type for alert-core operations.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// True for SQLite contention errors retried by
    /// [`crate::store::retry_on_contention`] (`SQLITE_BUSY`/`SQLITE_LOCKED`,
    /// the port's analog of the original's deadlock codes 1205/1213).
    ///
    /// Matched on the underlying driver message rather than a specific
    /// `libsql::Error` variant shape, since the crate's error enum is not
    /// guaranteed stable across versions.
    pub fn is_contention(&self) -> bool {
        match self {
            Error::Libsql(e) => {
                let msg = e.to_string();
                msg.contains("database is locked") || msg.contains("database table is locked")
            }
            _ => false,
        }
    }

    /// True for a unique-constraint violation, the port's analog of the
    /// original's duplicate-key error 1062, treated as success by
    /// insert-ignore patterns.
    pub fn is_duplicate(&self) -> bool {
        match self {
            Error::Libsql(e) => e.to_string().contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}
