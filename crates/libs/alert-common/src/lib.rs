pub mod config;
pub mod tracing;

pub use self::config::AppConfig;
