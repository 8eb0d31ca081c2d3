//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LoggingConfig;

const APP_DIR_NAME: &str = "activity-core";
const DB_FILE_NAME: &str = "activity-core.db";

pub const ENV_DATA_DIR: &str = "ACTIVITY_CORE_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "ACTIVITY_CORE_LOG_LEVEL";
pub const ENV_RETENTION_DAYS: &str = "ACTIVITY_CORE_RETENTION_DAYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of everything the core owns on disk
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    pub db_name: String,
    pub logging: LoggingConfig,
    /// Audio format used when a recording does not ask for one
    pub default_format: String,
    /// Age after which unreferenced audio files are swept; disabled when None
    pub file_retention: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        Self::with_data_dir(data_dir)
    }
}

impl AppConfig {
    /// Configuration rooted at an explicit data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            logging: LoggingConfig {
                logs_dir: Some(data_dir.join("logs")),
                ..LoggingConfig::default()
            },
            data_dir,
            db_name: DB_FILE_NAME.to_string(),
            default_format: "wav".to_string(),
            file_retention: None,
        }
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = match std::env::var(ENV_DATA_DIR) {
            Ok(dir) if !dir.trim().is_empty() => Self::with_data_dir(dir),
            _ => Self::default(),
        };

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                config.logging.level = level;
            }
        }

        if let Ok(days) = std::env::var(ENV_RETENTION_DAYS) {
            match days.trim().parse::<u64>() {
                Ok(days) if days > 0 => {
                    config.file_retention = Some(Duration::from_secs(days * 24 * 60 * 60));
                }
                _ => log::warn!("Ignoring invalid {} value: {}", ENV_RETENTION_DAYS, days),
            }
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
