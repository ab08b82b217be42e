//! # alert-core: the Alert Correlation Core
//!
//! `alert-core` owns the Alert aggregate, the distributed row lock that
//! coordinates analysis workers across processes and hosts, the mapping
//! synchronizer that keeps alert↔{tag,observable,profile-point} edges
//! idempotent, and the ingestion paths (bro-SMTP consumer, mailbox
//! ingestor) that create new alerts.
//!
//! ## Architecture
//!
//! - **BMC layer** ([`model`]): stateless controllers for all database
//!   operations, one per entity, following the BMC (Backend Model
//!   Controller) pattern.
//! - **Store layer** ([`store`]): connection pooling/caching, migrations,
//!   and the distributed lock.
//! - **Engine layer** ([`engine`]): the in-memory analysis tree
//!   ([`engine::root_analysis`]), the bro-SMTP consumer
//!   ([`engine::bro_smtp`]), the mailbox ingestor ([`engine::mailbox`]),
//!   and the analysis-pipeline hooks ([`engine::hooks`]).
//! - [`business_time`]: SLA/business-hours arithmetic.
//! - [`ctx`]: request context carrying the acting user id for audit columns.
//!
//! ## Example
//!
//! ```no_run
//! use alert_core::model::{ModelManager, alert::AlertBmc};
//! use alert_core::ctx::Ctx;
//! use std::sync::Arc;
//!
//! async fn example() -> alert_core::Result<()> {
//!     let mm = ModelManager::new(Arc::new(alert_common::AppConfig::default())).await?;
//!     let ctx = Ctx::root_ctx();
//!     AlertBmc::set_owner(&mm, 1, &ctx).await?;
//!     let alert = AlertBmc::get(&mm, 1).await?;
//!     println!("alert type: {}", alert.alert_type);
//!     Ok(())
//! }
//! ```

/// Request context for attributing writes to a user.
pub mod ctx;

/// Error types and Result alias for alert-core operations.
pub mod error;

/// Backend Model Controllers (BMC) and data models for all entities.
pub mod model;

/// Low-level storage operations: connection pooling/caching, migrations,
/// and the distributed alert lock.
pub mod store;

/// Ingestion and analysis-pipeline: the in-memory analysis tree, the
/// bro-SMTP consumer, the mailbox ingestor, and the pipeline hooks.
pub mod engine;

/// Business-time/SLA arithmetic.
pub mod business_time;

/// Utility functions and helpers (validation, ...).
pub mod utils;

// Re-export core types
pub use ctx::Ctx;
pub use error::{Error, Result};
pub use model::ModelManager;
