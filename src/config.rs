//! Service configuration read from the environment
use super::error::ConfigError;
use super::flow::MAX_APPROVAL_LEVELS;
use std::path::PathBuf;

pub const DB_PATH_KEY: &str = "REPORT_DB_PATH";
pub const APPROVAL_LEVELS_KEY: &str = "REPORT_APPROVAL_LEVELS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub db_path: PathBuf,
    /// Number of approval steps opened for every submission.
    pub approval_levels: u8,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("report.db"),
            approval_levels: 3,
        }
    }
}

impl ReportConfig {
    /// Load from process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(DB_PATH_KEY) {
            if path.trim().is_empty() {
                return Err(ConfigError::Empty(DB_PATH_KEY));
            }
            config.db_path = PathBuf::from(path.trim());
        }

        if let Some(raw) = lookup(APPROVAL_LEVELS_KEY) {
            config.approval_levels = raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|levels| (1..=MAX_APPROVAL_LEVELS).contains(levels))
                .ok_or(ConfigError::InvalidLevels {
                    key: APPROVAL_LEVELS_KEY,
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }
}
