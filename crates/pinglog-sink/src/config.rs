//! TOML configuration for the log files, error routing and S3 offload.
//!
//! A missing configuration file is not an error: [`Config::load`] falls back
//! to [`Config::default_offload`] so a bare install still produces a daily
//! upload schedule.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::schedule::{self, ScheduleSpec};

/// Default log file used when nothing else is configured.
pub const DEFAULT_LOG_FILE: &str = "ping.log";

/// Where error lines are written.
///
/// Unknown values deserialize to [`ErrorLogMode::Both`] so a typo in the
/// config never drops error lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorLogMode {
    /// Primary file only.
    Same,
    /// Primary file and error file.
    #[default]
    Both,
    /// Error file only.
    Error,
}

impl ErrorLogMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::Both => "both",
            Self::Error => "error",
        }
    }
}

impl From<&str> for ErrorLogMode {
    fn from(value: &str) -> Self {
        match value.trim() {
            "same" => Self::Same,
            "error" => Self::Error,
            _ => Self::Both,
        }
    }
}

impl From<String> for ErrorLogMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ErrorLogMode> for String {
    fn from(mode: ErrorLogMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ErrorLogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local log files, one per monitored target.
    pub log_files: Vec<PathBuf>,

    /// Routing of error lines between the primary and error files.
    pub error_log_mode: ErrorLogMode,

    /// Remote offload settings.
    pub s3: S3Config,
}

/// S3 (or S3-compatible) offload settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub key_prefix: String,
    pub access_key: String,
    pub secret_key: String,

    /// Custom endpoint. Without a scheme, `tls` decides between http and https.
    pub endpoint: String,

    pub force_path_style: bool,

    /// Unset means TLS on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,

    /// Cron expression. Takes precedence over `upload_time`.
    pub schedule: String,

    /// Legacy daily `HH:MM` upload time.
    pub upload_time: String,

    /// Remove local files after a successful upload.
    pub delete_after: bool,
}

impl S3Config {
    /// Offload is enabled as soon as either schedule syntax is set.
    pub fn is_enabled(&self) -> bool {
        !self.schedule.trim().is_empty() || !self.upload_time.trim().is_empty()
    }

    /// The upload schedule, or `None` when offload is disabled.
    pub fn schedule_spec(&self) -> Result<Option<ScheduleSpec>, ConfigError> {
        Ok(ScheduleSpec::from_settings(&self.schedule, &self.upload_time)?)
    }

    /// The custom endpoint with its scheme resolved, if one is configured.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Some(endpoint.to_string());
        }
        let scheme = if self.tls.unwrap_or(true) {
            "https"
        } else {
            "http"
        };
        Some(format!("{scheme}://{endpoint}"))
    }
}

impl Config {
    /// Configuration used when the config file does not exist.
    pub fn default_offload() -> Self {
        Self {
            log_files: vec![PathBuf::from(DEFAULT_LOG_FILE)],
            error_log_mode: ErrorLogMode::default(),
            s3: S3Config {
                region: "ap-northeast-1".to_string(),
                bucket: "default-bucket".to_string(),
                key_prefix: "logs".to_string(),
                upload_time: "00:00".to_string(),
                delete_after: false,
                ..Default::default()
            },
        }
    }

    /// Template written by [`Config::write_default`].
    pub fn template() -> Self {
        let mut config = Self::default_offload();
        config.s3.bucket = "your-bucket-name".to_string();
        config
    }

    /// Load and validate a config file, or return defaults if it is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default_offload());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), files = config.log_files.len(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the settings a running logger depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_files.is_empty() {
            return Err(ConfigError::validation(
                "at least one log file path is required",
            ));
        }

        let s3 = &self.s3;
        if !s3.is_enabled() {
            return Ok(());
        }

        let required = [
            ("bucket", &s3.bucket),
            ("region", &s3.region),
            ("access_key", &s3.access_key),
            ("secret_key", &s3.secret_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::validation(format!(
                    "s3.{name} is required when an upload schedule is set"
                )));
            }
        }

        if s3.schedule.trim().is_empty() {
            schedule::parse_daily_time(&s3.upload_time)?;
        }
        Ok(())
    }

    /// Write the template configuration to `path`.
    pub fn write_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = Self::template().to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Wrote default config");
        Ok(())
    }
}
