use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeConfig {
    pub version: String,
    /// Maximum number of jobs processed concurrently.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Cap on PENDING jobs; `None` means unbounded.
    #[serde(default)]
    pub max_pending: Option<usize>,
    /// How long terminal jobs stay queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// `null` disables the timeout.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: Option<u64>,
    #[serde(default = "default_template_cache_ttl_secs")]
    pub template_cache_ttl_secs: u64,
    #[serde(default = "default_template_cache_capacity")]
    pub template_cache_capacity: u64,
    /// Two-digit jurisdiction code of the receiving business.
    #[serde(default)]
    pub buyer_jurisdiction: Option<String>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub delete_upload_on_success: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    3
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_extraction_timeout_secs() -> Option<u64> {
    Some(120)
}

fn default_template_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_template_cache_capacity() -> u64 {
    10_000
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            worker_count: default_worker_count(),
            max_pending: None,
            retention_secs: default_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            template_cache_ttl_secs: default_template_cache_ttl_secs(),
            template_cache_capacity: default_template_cache_capacity(),
            buyer_jurisdiction: None,
            database_path: None,
            delete_upload_on_success: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl IntakeConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn extraction_timeout(&self) -> Option<Duration> {
        self.extraction_timeout_secs.map(Duration::from_secs)
    }

    pub fn template_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.template_cache_ttl_secs)
    }

    /// Configured database path, or `~/.intake/data/intake.db`.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
