//! Upload sweeps over every tracked source.
//!
//! A sweep holds one lock for its whole duration, so a manual trigger and a
//! scheduled trigger never upload concurrently. Failures are per file: one
//! failed upload is logged and the sweep moves on.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::UploadError;
use crate::sink::LogSink;
use crate::upload::Uploader;

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Keys of the objects stored by this sweep.
    pub uploaded: Vec<String>,
    /// Number of files whose upload failed.
    pub failed: usize,
    /// The last failure seen, if any.
    pub last_error: Option<UploadError>,
}

impl SweepReport {
    fn record(&mut self, path: &Path, result: Result<String, UploadError>) {
        match result {
            Ok(key) => {
                info!(path = %path.display(), key = %key, "Uploaded log file");
                self.uploaded.push(key);
            }
            Err(e) => {
                if e.is_partial() {
                    warn!(path = %path.display(), error = %e, "Log file uploaded but not removed");
                } else {
                    error!(path = %path.display(), error = %e, "Failed to upload log file");
                }
                self.failed += 1;
                self.last_error = Some(e);
            }
        }
    }

    pub fn into_result(self) -> Result<(), UploadError> {
        match self.last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Ships a sink's primary and error files through an [`Uploader`].
pub struct Offloader {
    sink: Arc<LogSink>,
    uploader: Arc<dyn Uploader>,
    sweep_lock: Mutex<()>,
}

impl Offloader {
    pub fn new(sink: Arc<LogSink>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            sink,
            uploader,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Run one sweep in index order. The error file of a source is only
    /// uploaded when it exists.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        let mut report = SweepReport::default();

        for source in self.sink.sources() {
            let result = self.uploader.upload_file(source.path()).await;
            report.record(source.path(), result);

            let error_path = source.error_path();
            if matches!(tokio::fs::try_exists(error_path).await, Ok(true)) {
                let result = self.uploader.upload_file(error_path).await;
                report.record(error_path, result);
            }
        }

        info!(
            uploaded = report.uploaded.len(),
            failed = report.failed,
            "Upload sweep finished"
        );
        report
    }

    /// Scheduled trigger. Failures are only logged.
    pub async fn upload_all(&self) {
        self.sweep().await;
    }

    /// Manual trigger. Returns the last failure of the sweep.
    pub async fn upload_now(&self) -> Result<(), UploadError> {
        self.sweep().await.into_result()
    }
}
