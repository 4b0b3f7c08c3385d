// Daemon configuration from OUTBOX_* environment variables

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "~/.outbox/outbox.db";
pub const DEFAULT_KEY: &str = "default";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("OUTBOX_KEYS contains no keys")]
    NoKeys,

    #[error("OUTBOX_LOG_FORMAT must be 'pretty' or 'json', got {0:?}")]
    InvalidLogFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub db_path: String,
    pub keys: Vec<String>,
    pub lease: Option<Duration>,
    pub concurrency: Option<u32>,
    pub max_attempts: Option<u32>,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("OUTBOX_DB_PATH")
            .unwrap_or_else(|| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());

        let keys = match lookup("OUTBOX_KEYS") {
            Some(raw) => {
                let keys: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect();
                if keys.is_empty() {
                    return Err(ConfigError::NoKeys);
                }
                keys
            }
            None => vec![DEFAULT_KEY.to_string()],
        };

        let log_format = match lookup("OUTBOX_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        Ok(Self {
            db_path,
            keys,
            lease: parse_number(&lookup, "OUTBOX_LEASE_SECS")?.map(Duration::from_secs),
            concurrency: parse_number(&lookup, "OUTBOX_CONCURRENCY")?,
            max_attempts: parse_number(&lookup, "OUTBOX_MAX_ATTEMPTS")?,
            log_format,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path)
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}
