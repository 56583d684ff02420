//! A monitored source and the append-only files it owns.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SinkError;

/// Derive the error log path: `dir/base.ext` becomes `dir/base.error.ext`,
/// and `dir/base` becomes `dir/base.error`.
pub fn error_log_path(path: &Path) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(".error");
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[derive(Debug)]
struct HandleState {
    file: Option<File>,
    closed: bool,
}

/// An append handle that reopens its file when the path disappears.
///
/// The existence check, the reopen and the write all happen under one lock,
/// so a write never lands on a handle that is being replaced.
#[derive(Debug)]
pub(crate) struct TrackedFile {
    path: PathBuf,
    state: Mutex<HandleState>,
}

impl TrackedFile {
    pub(crate) fn open(path: PathBuf) -> Result<Self, SinkError> {
        let file = open_append(&path).map_err(|source| SinkError::FileOpen {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            state: Mutex::new(HandleState {
                file: Some(file),
                closed: false,
            }),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Recreate the file if it was removed, without writing to it.
    pub(crate) fn ensure_exists(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        self.reopen_if_missing(&mut state)
    }

    pub(crate) fn append(&self, line: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        self.reopen_if_missing(&mut state)?;

        let Some(file) = state.file.as_mut() else {
            return Err(SinkError::Closed);
        };
        file.write_all(line.as_bytes())
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn reopen_if_missing(&self, state: &mut HandleState) -> Result<(), SinkError> {
        if state.closed {
            return Err(SinkError::Closed);
        }

        // Only a definite "not found" triggers a reopen; an inaccessible
        // parent is left to fail on the write itself.
        let missing = matches!(self.path.try_exists(), Ok(false));
        if missing || state.file.is_none() {
            if let Some(old) = state.file.take() {
                drop(old);
                warn!(path = %self.path.display(), "Log file was removed, recreating");
            }
            let file = open_append(&self.path).map_err(|source| SinkError::FileRecreate {
                path: self.path.clone(),
                source,
            })?;
            state.file = Some(file);
        }
        Ok(())
    }

    /// Sync and release the handle. Later appends fail with `Closed`.
    pub(crate) fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.closed = true;
        let Some(file) = state.file.take() else {
            return Ok(());
        };
        file.sync_all().map_err(|source| SinkError::Close {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Closed log file");
        Ok(())
    }
}

/// One monitored target with its primary and error log files.
#[derive(Debug)]
pub struct Source {
    index: usize,
    pub(crate) primary: TrackedFile,
    pub(crate) error: TrackedFile,
}

impl Source {
    /// Open (creating if needed) both files for `path`.
    pub(crate) fn open(index: usize, path: PathBuf) -> Result<Self, SinkError> {
        let error_path = error_log_path(&path);
        let primary = TrackedFile::open(path)?;
        let error = TrackedFile::open(error_path)?;
        Ok(Self {
            index,
            primary,
            error,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Primary log file.
    pub fn path(&self) -> &Path {
        self.primary.path()
    }

    /// Derived error log file.
    pub fn error_path(&self) -> &Path {
        self.error.path()
    }

    /// Close both files, returning the last error.
    pub(crate) fn close(&self) -> Result<(), SinkError> {
        let primary = self.primary.close();
        let error = self.error.close();
        error.and(primary)
    }
}
