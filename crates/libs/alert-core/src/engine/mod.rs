//! Ingestion and analysis-pipeline layer.
//!
//! [`root_analysis`] is the in-memory tree an ingestor builds up before
//! handing it to [`crate::model::alert::AlertBmc::sync`]. [`bro_smtp`] and
//! [`mailbox`] are the two ingestion paths: one produces many new alerts
//! out of a single bro-SMTP capture, the other ingests one already-
//! complete RFC822 file as one alert. [`hooks`] holds the `post_analysis`,
//! `cleanup`, and `should_alert` contracts a worker calls after an
//! analysis module runs.

pub mod bro_smtp;
pub mod hooks;
pub mod mailbox;
pub mod root_analysis;
