//! The probe logger: a sink plus optional scheduled offload.
//!
//! Without a config path the logger is a plain local sink. With one, the
//! config decides the error routing and, when an upload schedule is set, an
//! [`S3Uploader`], an [`Offloader`] and a running [`Scheduler`] are attached.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tracing::info;

use crate::config::{Config, ErrorLogMode};
use crate::error::{Result, SinkError, UploadError};
use crate::offload::Offloader;
use crate::schedule::{ScheduleSpec, Scheduler};
use crate::sink::LogSink;
use crate::upload::{S3Uploader, Uploader};

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    /// Settings file. Enables remote offload when it configures a schedule.
    pub config_path: Option<PathBuf>,
    /// Run one best-effort sweep before the schedule starts.
    pub upload_existing: bool,
}

pub struct PingLogger {
    sink: Arc<LogSink>,
    offloader: Option<Arc<Offloader>>,
    scheduler: Option<Scheduler>,
}

impl PingLogger {
    /// Open the log files and, if configured, start scheduled offload.
    ///
    /// Any failure here (unreadable config, bad schedule, unopenable file)
    /// is returned before a schedule is started, and every file opened so
    /// far is closed again.
    pub async fn open<P>(paths: &[P], options: LoggerOptions) -> Result<Self>
    where
        P: Into<PathBuf> + Clone,
    {
        let Some(config_path) = &options.config_path else {
            let sink = LogSink::open(paths, ErrorLogMode::default())?;
            return Ok(Self::local(sink));
        };

        let config = Config::load(config_path)?;
        Self::from_config(paths, &config, options.upload_existing).await
    }

    /// Like [`PingLogger::open`] with settings that are already loaded.
    pub async fn from_config<P>(paths: &[P], config: &Config, upload_existing: bool) -> Result<Self>
    where
        P: Into<PathBuf> + Clone,
    {
        let sink = LogSink::open(paths, config.error_log_mode)?;
        let Some(spec) = config.s3.schedule_spec()? else {
            info!("No upload schedule configured, remote offload disabled");
            return Ok(Self::local(sink));
        };

        let uploader = S3Uploader::from_config(&config.s3)?;
        Self::with_uploader(sink, Arc::new(uploader), Some(spec), upload_existing).await
    }

    /// A sink without remote offload.
    pub fn local(sink: LogSink) -> Self {
        Self {
            sink: Arc::new(sink),
            offloader: None,
            scheduler: None,
        }
    }

    /// Attach `uploader` to `sink`, optionally sweeping once and then
    /// running `schedule`.
    ///
    /// The schedule is compiled before the initial sweep so an invalid
    /// expression fails without touching any file.
    pub async fn with_uploader(
        sink: LogSink,
        uploader: Arc<dyn Uploader>,
        schedule: Option<ScheduleSpec>,
        upload_existing: bool,
    ) -> Result<Self> {
        let compiled = schedule
            .as_ref()
            .map(|spec| spec.compile().map(|s| (spec, s)))
            .transpose()?;

        let sink = Arc::new(sink);
        let offloader = Arc::new(Offloader::new(Arc::clone(&sink), uploader));

        if upload_existing {
            info!("Uploading existing log files");
            offloader.upload_all().await;
        }

        let scheduler = compiled.map(|(spec, schedule)| {
            info!(schedule = %spec.cron_expression(), "Starting upload schedule");
            let offloader = Arc::clone(&offloader);
            Scheduler::spawn(schedule, move || {
                let offloader = Arc::clone(&offloader);
                async move { offloader.upload_all().await }
            })
        });

        Ok(Self {
            sink,
            offloader: Some(offloader),
            scheduler,
        })
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn is_offload_enabled(&self) -> bool {
        self.offloader.is_some()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduler.as_ref().is_some_and(Scheduler::is_running)
    }

    pub fn record_success<Tz>(
        &self,
        index: usize,
        target: &str,
        timestamp: &DateTime<Tz>,
        rtt: Duration,
    ) -> std::result::Result<(), SinkError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.sink.record_success(index, target, timestamp, rtt)
    }

    pub fn record_failure<Tz>(
        &self,
        index: usize,
        target: &str,
        timestamp: &DateTime<Tz>,
        detail: impl Display,
    ) -> std::result::Result<(), SinkError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.sink.record_failure(index, target, timestamp, detail)
    }

    /// Upload every file now and report the last failure.
    pub async fn upload_now(&self) -> std::result::Result<(), UploadError> {
        match &self.offloader {
            Some(offloader) => offloader.upload_now().await,
            None => Err(UploadError::NotConfigured),
        }
    }

    /// Stop the schedule, then close every file.
    pub async fn close(&mut self) -> std::result::Result<(), SinkError> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
            info!("Upload schedule stopped");
        }
        self.sink.close()
    }
}
