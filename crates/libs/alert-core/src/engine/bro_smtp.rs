//! Directory-watching reassembler for bro-SMTP captures.
//!
//! A file `X.ready` signals that `X` is a finalized capture. The capture
//! body is a line-oriented SMTP trace (`> ` client→server, `< `
//! server→client) reassembled by a two-state machine into one or more
//! RFC822 messages, each submitted as its own alert.

use crate::engine::root_analysis::RootAnalysis;
use crate::model::alert::{AlertBmc, AlertForCreate};
use crate::model::workload::WorkloadBmc;
use crate::model::ModelManager;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

lazy_static! {
    static ref REGEX_BRO_SMTP_SOURCE_IPV4: Regex =
        Regex::new(r"^(?P<ip>[0-9.]+):(?P<port>\d+)/(?P<proto>\w+)$").expect("valid regex");
    static ref REGEX_BRO_SMTP_MAIL_FROM: Regex =
        Regex::new(r"^>\s*MAIL FROM:\s*<(?P<addr>[^>]*)>").expect("valid regex");
    static ref REGEX_BRO_SMTP_RCPT_TO: Regex =
        Regex::new(r"^>\s*RCPT TO:\s*<(?P<addr>[^>]*)>").expect("valid regex");
    static ref REGEX_BRO_SMTP_DATA: Regex = Regex::new(r"^<\s*DATA 354").expect("valid regex");
}

/// Literal DATA-block terminator used by this capture format. Not
/// standard SMTP (which terminates on a bare `.`); this is the project's
/// chosen convention.
const DATA_TERMINATOR: &str = "> . .";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    Smtp,
    Data,
}

/// One reassembled e-mail plus the envelope metadata collected while
/// parsing the preceding SMTP trace lines.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub mail_from: Vec<String>,
    pub rcpt_to: Vec<String>,
    pub rfc822: String,
}

#[derive(Debug, Clone)]
pub struct ParsedCapture {
    pub source_ip: String,
    pub source_port: u16,
    pub proto: String,
    pub event_time: NaiveDateTime,
    pub emails: Vec<ParsedEmail>,
}

/// Parses a full bro-SMTP capture file body into its constituent e-mails.
pub fn parse_capture(contents: &str) -> Result<ParsedCapture> {
    let mut lines = contents.lines();

    let header1 = lines.next().ok_or_else(|| Error::MalformedCapture {
        path: String::new(),
        reason: "missing source header line".into(),
    })?;
    let captures = REGEX_BRO_SMTP_SOURCE_IPV4
        .captures(header1)
        .ok_or_else(|| Error::MalformedCapture {
            path: String::new(),
            reason: format!("unparseable source header: {header1}"),
        })?;
    let source_ip = captures["ip"].to_string();
    let source_port: u16 = captures["port"].parse().map_err(|_| Error::MalformedCapture {
        path: String::new(),
        reason: format!("invalid port in source header: {header1}"),
    })?;
    let proto = captures["proto"].to_string();

    let header2 = lines.next().ok_or_else(|| Error::MalformedCapture {
        path: String::new(),
        reason: "missing epoch timestamp line".into(),
    })?;
    let epoch: i64 = header2.trim().parse().map_err(|_| Error::MalformedCapture {
        path: String::new(),
        reason: format!("invalid epoch timestamp: {header2}"),
    })?;
    let event_time = DateTime::<Utc>::from_timestamp(epoch, 0)
        .ok_or_else(|| Error::MalformedCapture {
            path: String::new(),
            reason: format!("out-of-range epoch timestamp: {epoch}"),
        })?
        .naive_utc();

    let mut emails = Vec::new();
    let mut state = ParseState::Smtp;
    let mut mail_from = Vec::new();
    let mut rcpt_to = Vec::new();
    let mut rfc822_lines: Vec<&str> = Vec::new();

    for line in lines {
        match state {
            ParseState::Smtp => {
                if let Some(m) = REGEX_BRO_SMTP_MAIL_FROM.captures(line) {
                    mail_from.push(m["addr"].to_string());
                } else if let Some(m) = REGEX_BRO_SMTP_RCPT_TO.captures(line) {
                    rcpt_to.push(m["addr"].to_string());
                } else if REGEX_BRO_SMTP_DATA.is_match(line) {
                    state = ParseState::Data;
                    rfc822_lines.clear();
                }
            }
            ParseState::Data => {
                if line.trim_end() == DATA_TERMINATOR {
                    emails.push(ParsedEmail {
                        mail_from: std::mem::take(&mut mail_from),
                        rcpt_to: std::mem::take(&mut rcpt_to),
                        rfc822: rfc822_lines.join("\n"),
                    });
                    rfc822_lines.clear();
                    state = ParseState::Smtp;
                } else {
                    rfc822_lines.push(line);
                }
            }
        }
    }

    Ok(ParsedCapture {
        source_ip,
        source_port,
        proto,
        event_time,
        emails,
    })
}

pub struct BroSmtpConsumer {
    mm: ModelManager,
    watch_dir: PathBuf,
    collection_dir: PathBuf,
    collection_frequency: Duration,
}

impl BroSmtpConsumer {
    pub fn new(mm: ModelManager) -> Self {
        let watch_dir = PathBuf::from(&mm.app_config().engine.bro_smtp_dir);
        let collection_dir = PathBuf::from(&mm.app_config().engine.collection_dir);
        let collection_frequency = Duration::from_secs(mm.app_config().engine.collection_frequency);
        Self {
            mm,
            watch_dir,
            collection_dir,
            collection_frequency,
        }
    }

    /// Runs the scan loop until `shutdown` is set. Errors on one file
    /// never stop the loop; they're logged and that file is skipped.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        tokio::fs::create_dir_all(&self.watch_dir).await?;

        while !shutdown.load(Ordering::Relaxed) {
            let ready_files = self.list_ready_files().await?;
            for ready_path in ready_files {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = self.process_ready_file(&ready_path).await {
                    tracing::warn!(path = %ready_path.display(), error = %e, "bro-smtp capture processing failed, skipping");
                }
            }
            tokio::time::sleep(self.collection_frequency).await;
        }
        Ok(())
    }

    async fn list_ready_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.watch_dir).await?;
        let mut ready = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("ready") {
                ready.push(path);
            }
        }
        Ok(ready)
    }

    /// Processes one `X.ready` marker. Both `X` and `X.ready` are deleted
    /// after processing, even on failure of inner steps.
    async fn process_ready_file(&self, ready_path: &Path) -> Result<()> {
        let capture_path = ready_path.with_extension("");
        let result = self.process_capture_file(&capture_path).await;

        let _ = tokio::fs::remove_file(&capture_path).await;
        let _ = tokio::fs::remove_file(ready_path).await;

        result
    }

    async fn process_capture_file(&self, capture_path: &Path) -> Result<()> {
        let contents = tokio::fs::read_to_string(capture_path).await?;
        let parsed = parse_capture(&contents).map_err(|e| match e {
            Error::MalformedCapture { reason, .. } => Error::MalformedCapture {
                path: capture_path.display().to_string(),
                reason,
            },
            other => other,
        })?;

        for email in &parsed.emails {
            self.submit_email(&parsed, email).await?;
        }
        Ok(())
    }

    async fn submit_email(&self, capture: &ParsedCapture, email: &ParsedEmail) -> Result<()> {
        let storage_dir = self.collection_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&storage_dir).await?;
        let rfc822_path = storage_dir.join("email.rfc822");
        tokio::fs::write(&rfc822_path, &email.rfc822).await?;

        let mut root = RootAnalysis::new("email", "bro-smtp capture");
        root.add_file_observable("email.rfc822", &["ORIGINAL_EMAIL", "NO_SCAN", "ARCHIVE"]);
        root.observables.push(("ipv4".to_string(), capture.source_ip.clone()));
        for addr in email.mail_from.iter().chain(email.rcpt_to.iter()) {
            root.observables.push(("email_addr".to_string(), addr.clone()));
        }

        let data = AlertForCreate {
            uuid: None,
            storage_dir: storage_dir.to_string_lossy().to_string(),
            location: self.mm.node().to_string(),
            company_name: None,
            tool: "bro".to_string(),
            tool_instance: format!("{}:{}/{}", capture.source_ip, capture.source_port, capture.proto),
            alert_type: root.alert_type.clone(),
            description: root.description.clone(),
            event_time: capture.event_time,
        };

        let alert_id = AlertBmc::insert(&self.mm, data).await?;
        AlertBmc::sync(&self.mm, alert_id, &root, None).await?;
        WorkloadBmc::enqueue(&self.mm, alert_id).await?;
        Ok(())
    }
}
