//! Probe result log sink with scheduled offload to an object store.
//!
//! Each monitored target (a *source*) owns a primary log file and a derived
//! error log file. [`LogSink`] appends success and error lines to them
//! according to an [`ErrorLogMode`], and reopens files that were removed
//! underneath it. When remote offload is configured, [`Offloader`] ships the
//! files through an [`Uploader`] either on a [`Scheduler`] tick or on demand.
//!
//! [`PingLogger`] wires those pieces together from a [`Config`].

pub mod config;
pub mod error;
pub mod logger;
pub mod offload;
pub mod schedule;
pub mod sink;
pub mod upload;

pub use config::{Config, ErrorLogMode, S3Config};
pub use error::{ConfigError, Error, Result, ScheduleError, SinkError, UploadError};
pub use logger::{LoggerOptions, PingLogger};
pub use offload::{Offloader, SweepReport};
pub use schedule::{ScheduleSpec, Scheduler};
pub use sink::{LogSink, Source, error_log_path};
pub use upload::{S3Uploader, Uploader, object_key};
