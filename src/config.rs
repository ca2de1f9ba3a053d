//! Service configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. The binary first loads a `.env` file when one is present. Every section and field has a default, so an empty file (or no
//! file at all) yields a runnable configuration.
//!
//! | Variable           | Field                          |
//! |--------------------|--------------------------------|
//! | `PORT`             | `server.port`                  |
//! | `MAX_FILE_SIZE`    | `limits.max_file_size_bytes`   |
//! | `MAX_FILE_SIZE_MB` | `server.max_upload_mb`         |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main service configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub jobs: JobsSection,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on an upload request body, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> u64 {
    32
}

/// Submission validation limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    /// Largest accepted declared size
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Smallest accepted declared size; 0 accepts empty uploads
    #[serde(default)]
    pub min_file_size_bytes: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            min_file_size_bytes: 0,
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

/// Where processed output is kept
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Output directory for the filesystem backend
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("processed_files")
}

/// Byte store selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
}

/// Job scheduling and retention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsSection {
    /// Jobs allowed to run at once; unbounded when absent
    pub max_concurrent: Option<usize>,
    /// How long finished jobs are kept; forever when absent
    pub retention_secs: Option<u64>,
    /// How often the reaper runs when retention is set
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            retention_secs: None,
            reap_interval_secs: default_reap_interval(),
        }
    }
}

fn default_reap_interval() -> u64 {
    60
}

impl JobsSection {
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid value for environment variable {name}: '{value}'")]
    InvalidEnvVar { name: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

impl ServiceConfig {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ServiceConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load `KEY=value` pairs from `path` into the process environment.
    ///
    /// Variables that are already set keep their value. Returns `false` when
    /// the file does not exist.
    pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
        match dotenvy::from_path(path) {
            Ok(()) => Ok(true),
            Err(e) if e.not_found() => Ok(false),
            Err(e) => Err(ConfigError::EnvFile(e)),
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_env(&lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(max_file_size) = parse_env(&lookup, "MAX_FILE_SIZE")? {
            self.limits.max_file_size_bytes = max_file_size;
        }
        if let Some(max_upload_mb) = parse_env(&lookup, "MAX_FILE_SIZE_MB")? {
            self.server.max_upload_mb = max_upload_mb;
        }
        Ok(())
    }

    /// Reject combinations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.min_file_size_bytes > self.limits.max_file_size_bytes {
            return Err(ConfigError::InvalidConfig(format!(
                "min_file_size_bytes ({}) exceeds max_file_size_bytes ({})",
                self.limits.min_file_size_bytes, self.limits.max_file_size_bytes
            )));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_upload_mb must be at least 1".to_string(),
            ));
        }
        if self.jobs.max_concurrent == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "jobs.max_concurrent must be at least 1 when set".to_string(),
            ));
        }
        if self.jobs.reap_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "jobs.reap_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload body limit in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_env<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value,
            }),
    }
}
