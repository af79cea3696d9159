//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env` file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub gateway_url: String,
    pub session_dir: PathBuf,
    pub log_level: Level,
    pub notification_poll: Duration,
    pub enrollment_poll: Duration,
    pub popup_ttl: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for
    /// development, but this is skipped in test environments to ensure
    /// tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Gateway and Storage Settings ---
        let gateway_url = std::env::var("GATEWAY_URL")
            .map_err(|_| ConfigError::MissingVar("GATEWAY_URL".to_string()))?;
        let gateway_url = gateway_url.trim_end_matches('/').to_string();

        let session_dir = std::env::var("SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./session"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Polling and Timeout Settings ---
        let notification_poll = duration_var("NOTIFICATION_POLL_SECS", 15)?;
        let enrollment_poll = duration_var("ENROLLMENT_POLL_SECS", 5)?;
        let popup_ttl = duration_var("POPUP_TTL_SECS", 4)?;
        let http_timeout = duration_var("HTTP_TIMEOUT_SECS", 10)?;

        Ok(Self {
            gateway_url,
            session_dir,
            log_level,
            notification_poll,
            enrollment_poll,
            popup_ttl,
            http_timeout,
        })
    }
}

/// Reads an integer-seconds environment variable, falling back to `default`.
fn duration_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                ConfigError::InvalidValue(
                    name.to_string(),
                    format!("'{}' is not a whole number of seconds", raw),
                )
            }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
