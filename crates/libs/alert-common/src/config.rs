use config::{Config, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

/// Deployment tier. Gates which ingestion engines run (e.g. the bro-SMTP
/// consumer is typically disabled outside `PRODUCTION`).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceType {
    Production,
    Qa,
    Dev,
}

impl Default for InstanceType {
    fn default() -> Self {
        InstanceType::Dev
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub global: GlobalConfig,
    #[serde(default)]
    pub database: HashMap<String, DatabaseConfig>,
    #[serde(default)]
    pub mediawiki: MediawikiConfig,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub tag_css_class: HashMap<String, String>,
    pub engine: EngineConfig,
    #[serde(default)]
    pub sla: SlaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    #[serde(default)]
    pub instance_type: InstanceType,
    /// `MM:SS`, parsed by [`parse_lock_timeout`].
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,
    /// This process/host's node identity, used as `lock_owner` and as
    /// the `node` column in the workload queue.
    #[serde(default = "default_node")]
    pub node: String,
}

fn default_lock_timeout() -> String {
    "00:30".to_string()
}

fn default_node() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".into())
}

/// Parses `global.lock_timeout` (`MM:SS`) into seconds.
pub fn parse_lock_timeout(raw: &str) -> Result<i64, String> {
    let (minutes, seconds) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid lock_timeout {raw:?}, expected MM:SS"))?;
    let minutes: i64 = minutes
        .parse()
        .map_err(|_| format!("invalid minutes in lock_timeout {raw:?}"))?;
    let seconds: i64 = seconds
        .parse()
        .map_err(|_| format!("invalid seconds in lock_timeout {raw:?}"))?;
    Ok(minutes * 60 + seconds)
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub hostname: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub unix_socket: Option<String>,
    pub database: String,
    pub username: String,
    pub password: String,
}

fn default_db_port() -> u16 {
    3306
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MediawikiConfig {
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub bro_smtp_dir: String,
    pub collection_dir: String,
    /// Seconds to sleep between bro-SMTP directory scans.
    #[serde(default = "default_collection_frequency")]
    pub collection_frequency: u64,
    pub archive_dir: String,
    pub cache_dir: String,
}

fn default_collection_frequency() -> u64 {
    15
}

/// Business-hours SLA thresholds (spec's approaching/over-SLA guard).
#[derive(Debug, Deserialize, Clone)]
pub struct SlaConfig {
    #[serde(default = "default_sla_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sla_timeout_hours")]
    pub timeout_hours: i64,
    #[serde(default = "default_sla_warning_hours")]
    pub warning_hours: i64,
    #[serde(default)]
    pub excluded_alert_types: Vec<String>,
}

fn default_sla_enabled() -> bool {
    true
}

fn default_sla_timeout_hours() -> i64 {
    24
}

fn default_sla_warning_hours() -> i64 {
    4
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            enabled: default_sla_enabled(),
            timeout_hours: default_sla_timeout_hours(),
            warning_hours: default_sla_warning_hours(),
            excluded_alert_types: Vec::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig {
                instance_type: InstanceType::Dev,
                lock_timeout: default_lock_timeout(),
                node: default_node(),
            },
            database: HashMap::new(),
            mediawiki: MediawikiConfig::default(),
            tags: HashMap::new(),
            tag_css_class: HashMap::new(),
            engine: EngineConfig {
                bro_smtp_dir: "data/bro_smtp".into(),
                collection_dir: "data/alerts".into(),
                collection_frequency: default_collection_frequency(),
                archive_dir: "data/archive".into(),
                cache_dir: "data/cache".into(),
            },
            sla: SlaConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration with 12-factor app compliant env var support.
    ///
    /// Priority order (highest to lowest):
    /// 1. `ALERT_CORE_HOME`-relative overrides for the engine directories
    /// 2. Config files (`config/default.toml`, `config/{run_mode}.toml`)
    /// 3. Hardcoded defaults
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .set_default("global.instance_type", "DEV")?
            .set_default("global.lock_timeout", default_lock_timeout())?
            .set_default("global.node", default_node())?
            .set_default("engine.bro_smtp_dir", "data/bro_smtp")?
            .set_default("engine.collection_dir", "data/alerts")?
            .set_default(
                "engine.collection_frequency",
                default_collection_frequency() as i64,
            )?
            .set_default("engine.archive_dir", "data/archive")?
            .set_default("engine.cache_dir", "data/cache")?
            .set_default("sla.enabled", default_sla_enabled())?
            .set_default("sla.timeout_hours", default_sla_timeout_hours())?
            .set_default("sla.warning_hours", default_sla_warning_hours())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false));

        // SAQ_HOME-style install root override: relocate the engine
        // directories underneath it unless the config files set them.
        if let Ok(home) = env::var("ALERT_CORE_HOME") {
            builder = builder
                .set_override("engine.bro_smtp_dir", format!("{home}/bro_smtp"))?
                .set_override("engine.collection_dir", format!("{home}/alerts"))?
                .set_override("engine.archive_dir", format!("{home}/archive"))?
                .set_override("engine.cache_dir", format!("{home}/cache"))?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock_timeout() {
        assert_eq!(parse_lock_timeout("00:30").unwrap(), 30);
        assert_eq!(parse_lock_timeout("05:00").unwrap(), 300);
        assert_eq!(parse_lock_timeout("00:00").unwrap(), 0);
    }

    #[test]
    fn test_parse_lock_timeout_rejects_malformed() {
        assert!(parse_lock_timeout("bogus").is_err());
        assert!(parse_lock_timeout("5").is_err());
    }

    #[test]
    fn test_default_config_has_sane_engine_dirs() {
        let config = AppConfig::default();
        assert_eq!(config.engine.collection_frequency, 15);
        assert!(!config.engine.bro_smtp_dir.is_empty());
    }
}
