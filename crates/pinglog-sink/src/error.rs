//! Error types for the sink, upload, schedule and configuration layers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of the local append path.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("invalid source index {index} (sink has {len} sources)")]
    InvalidIndex { index: usize, len: usize },

    #[error("failed to open log file {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to recreate log file {}: {source}", path.display())]
    FileRecreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to close log file {}: {source}", path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log sink is closed")]
    Closed,
}

/// Failures of a single file upload.
///
/// `FileOpen` and `Upload` mean nothing reached the store. `Delete` means the
/// object was stored but the local file could not be removed afterwards.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to open {} for upload: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to upload object {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("uploaded {key} but failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build object store client: {0}")]
    Client(#[from] object_store::Error),

    #[error("remote offload is not configured")]
    NotConfigured,
}

impl UploadError {
    /// True when the object reached the store even though the call failed.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Failures while turning schedule settings into a running schedule.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid upload time {value:?}, expected HH:MM: {source}")]
    TimeFormat {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("upload time {value:?} does not exist in the local timezone today")]
    NonexistentLocalTime { value: String },

    #[error("invalid cron expression {expression:?}: {source}")]
    Validation {
        expression: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("no upload schedule configured")]
    Missing,
}

/// Failures while loading, validating or writing the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
