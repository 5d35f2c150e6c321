//! Store configuration
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Unset variables fall back to defaults; malformed ones are errors.

use std::path::PathBuf;
use std::time::Duration;

use crate::db::schema::CURRENT_VERSION;
use crate::db::RetryPolicy;
use crate::errors::{Result, SidebarError};

pub const ENV_DB_PATH: &str = "INSIDEBAR_DB_PATH";
pub const ENV_RETRY_ATTEMPTS: &str = "INSIDEBAR_RETRY_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "INSIDEBAR_RETRY_BASE_MS";
pub const ENV_LOG: &str = "INSIDEBAR_LOG";

pub const DEFAULT_LOG_FILTER: &str = "insidebar_core=info";
const DB_FILE_NAME: &str = "insidebar.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path:        PathBuf,
    pub schema_version: u32,
    pub retry:          RetryPolicy,
    pub log_filter:     String,
}

impl StoreConfig {
    /// Defaults for a store file at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path:        path.into(),
            schema_version: CURRENT_VERSION,
            retry:          RetryPolicy::default(),
            log_filter:     DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Read configuration from `.env` and the environment
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the normal case
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let mut config = Self::at(db_path);

        if let Some(attempts) = parse_var::<u32>(&lookup, ENV_RETRY_ATTEMPTS)? {
            if attempts == 0 {
                return Err(SidebarError::ConfigError(format!(
                    "{} must be at least 1",
                    ENV_RETRY_ATTEMPTS
                )));
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(base_ms) = parse_var::<u64>(&lookup, ENV_RETRY_BASE_MS)? {
            config.retry.base_delay = Duration::from_millis(base_ms);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SidebarError::ConfigError(format!("Invalid value for {}: {:?}", key, raw))),
    }
}

/// `<data dir>/insidebar/insidebar.db`
pub fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| SidebarError::ConfigError("Could not determine a data directory".into()))?;
    Ok(base.join("insidebar").join(DB_FILE_NAME))
}
