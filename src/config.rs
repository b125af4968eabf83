//! Runtime configuration
//!
//! The runner, HTTP client and storage settings, loaded from a YAML (or JSON)
//! file. Every field has a default so an empty document is a valid config.

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration for an ETL process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Subtask runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// HTTP client settings shared by every stream
    #[serde(default)]
    pub http: HttpConfig,

    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl EtlConfig {
    /// Parse a config from a YAML string (JSON is valid YAML)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.runner.checkpoint_interval == 0 {
            return Err(Error::invalid_value(
                "runner.checkpoint_interval",
                "must be greater than zero",
            ));
        }
        if self.runner.fetch_batch_size == 0 {
            return Err(Error::invalid_value(
                "runner.fetch_batch_size",
                "must be greater than zero",
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(Error::invalid_value(
                "http.timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Runner Config
// ============================================================================

/// Where an incremental run takes its starting state from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeFrom {
    /// State of the most recent run that completed; checkpoints of failed runs are ignored
    #[default]
    LastCompletedRun,
    /// State of the most recent run that completed or checkpointed
    LastCheckpoint,
}

/// Subtask runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Items processed between state checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Resume policy for incremental runs
    #[serde(default)]
    pub resume_from: ResumeFrom,

    /// Rows read per storage round trip in extract/convert
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            resume_from: ResumeFrom::default(),
            fetch_batch_size: default_fetch_batch_size(),
        }
    }
}

fn default_checkpoint_interval() -> usize {
    100
}

fn default_fetch_batch_size() -> usize {
    500
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How many times a 429 response is retried before giving up
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Wait used when a 429 response carries no Retry-After header
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,

    /// Client-side request budget; unlimited when absent
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            default_retry_after_secs: default_retry_after(),
            requests_per_second: None,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default Retry-After as a duration
    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_retry_after() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("devlake-etl/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Database Config
// ============================================================================

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// DuckDB database file; `:memory:` keeps everything in memory
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    /// Whether the database lives in memory only
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("devlake.duckdb")
}
