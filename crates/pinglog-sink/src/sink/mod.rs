//! Local append-only probe log sink.
//!
//! Sources are indexed `0..N` in the order their paths were given and keep
//! that index for the life of the sink. Every write first checks that the
//! target file still exists and recreates it if it was removed (for example
//! by a delete-after-upload sweep or an external rotation).

mod source;

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tracing::{debug, warn};

use crate::config::ErrorLogMode;
use crate::error::SinkError;

pub use source::{Source, error_log_path};

/// Timestamp layout of every log line.
pub const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a success line. The RTT uses `Duration`'s `Debug` form (`15ms`).
pub fn success_line<Tz>(timestamp: &DateTime<Tz>, target: &str, rtt: Duration) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "[{}] SUCCESS - Target: {}, RTT: {:?}\n",
        timestamp.format(LINE_TIMESTAMP_FORMAT),
        target,
        rtt
    )
}

/// Format an error line.
pub fn error_line<Tz>(timestamp: &DateTime<Tz>, target: &str, detail: impl Display) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "[{}] ERROR - Target: {}, Error: {}\n",
        timestamp.format(LINE_TIMESTAMP_FORMAT),
        target,
        detail
    )
}

/// Per-source primary and error log files with error routing.
#[derive(Debug)]
pub struct LogSink {
    sources: Vec<Source>,
    mode: ErrorLogMode,
}

impl LogSink {
    /// Open one source per path. Fails without leaving any file open.
    pub fn open<P>(paths: &[P], mode: ErrorLogMode) -> Result<Self, SinkError>
    where
        P: Into<PathBuf> + Clone,
    {
        let sources = paths
            .iter()
            .enumerate()
            .map(|(index, path)| Source::open(index, path.clone().into()))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(sources = sources.len(), mode = %mode, "Opened log sink");
        Ok(Self { sources, mode })
    }

    pub fn mode(&self) -> ErrorLogMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources in index order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    fn source(&self, index: usize) -> Result<&Source, SinkError> {
        self.sources.get(index).ok_or(SinkError::InvalidIndex {
            index,
            len: self.sources.len(),
        })
    }

    /// Append a success line to the source's primary file.
    pub fn record_success<Tz>(
        &self,
        index: usize,
        target: &str,
        timestamp: &DateTime<Tz>,
        rtt: Duration,
    ) -> Result<(), SinkError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let source = self.source(index)?;
        source.primary.append(&success_line(timestamp, target, rtt))
    }

    /// Append an error line, routed by the sink's [`ErrorLogMode`].
    ///
    /// The primary file is recreated if missing in every mode, even when
    /// the line only goes to the error file. In `both` and `error` mode the
    /// error file is written even if the primary failed; the error file's
    /// failure is returned if there is one, otherwise the primary's.
    pub fn record_failure<Tz>(
        &self,
        index: usize,
        target: &str,
        timestamp: &DateTime<Tz>,
        detail: impl Display,
    ) -> Result<(), SinkError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let source = self.source(index)?;
        let line = error_line(timestamp, target, detail);

        match self.mode {
            ErrorLogMode::Same => source.primary.append(&line),
            ErrorLogMode::Error => {
                let primary = source.primary.ensure_exists();
                let error = source.error.append(&line);
                error.and(primary)
            }
            ErrorLogMode::Both => {
                let primary = source.primary.append(&line);
                let error = source.error.append(&line);
                error.and(primary)
            }
        }
    }

    /// Close every source's files. Safe to call more than once.
    pub fn close(&self) -> Result<(), SinkError> {
        let mut result = Ok(());
        for source in &self.sources {
            if let Err(e) = source.close() {
                warn!(index = source.index(), error = %e, "Failed to close log files");
                result = Err(e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};
    use rstest::rstest;
    use std::path::Path;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    fn open_sink(temp: &TempDir, names: &[&str], mode: ErrorLogMode) -> LogSink {
        let paths: Vec<PathBuf> = names.iter().map(|n| temp.path().join(n)).collect();
        LogSink::open(&paths, mode).unwrap()
    }

    #[test]
    fn test_success_line_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            success_line(&ts, "example.com", Duration::from_millis(15)),
            "[2024-05-06 07:08:09] SUCCESS - Target: example.com, RTT: 15ms\n"
        );
    }

    #[test]
    fn test_error_line_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            error_line(&ts, "10.0.0.1", "request timed out"),
            "[2024-05-06 07:08:09] ERROR - Target: 10.0.0.1, Error: request timed out\n"
        );
    }

    #[test]
    fn test_one_line_per_record() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["a.log", "b.log"], ErrorLogMode::Same);
        let now = Local::now();

        for i in 0..5 {
            sink.record_success(0, "a", &now, Duration::from_millis(i)).unwrap();
        }
        sink.record_failure(1, "b", &now, "unreachable").unwrap();

        let a = read(&temp.path().join("a.log"));
        assert_eq!(a.lines().count(), 5);
        assert!(a.lines().all(|l| l.contains("SUCCESS - Target: a, RTT: ")));
        assert_eq!(read(&temp.path().join("b.log")).lines().count(), 1);
    }

    #[rstest]
    #[case(ErrorLogMode::Same, true, false)]
    #[case(ErrorLogMode::Both, true, true)]
    #[case(ErrorLogMode::from("whatever"), true, true)]
    #[case(ErrorLogMode::Error, false, true)]
    fn test_error_routing(
        #[case] mode: ErrorLogMode,
        #[case] in_primary: bool,
        #[case] in_error: bool,
    ) {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], mode);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        sink.record_failure(0, "host", &ts, "timeout").unwrap();

        let expected = "[2024-01-01 00:00:00] ERROR - Target: host, Error: timeout\n";
        let primary = read(&temp.path().join("ping.log"));
        let error = read(&temp.path().join("ping.error.log"));
        assert_eq!(primary == expected, in_primary, "primary: {primary:?}");
        assert_eq!(error == expected, in_error, "error: {error:?}");
        assert_eq!(primary.is_empty(), !in_primary);
        assert_eq!(error.is_empty(), !in_error);
    }

    #[test]
    fn test_deleted_file_is_recreated() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], ErrorLogMode::Both);
        let path = temp.path().join("ping.log");
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        sink.record_success(0, "host", &ts, Duration::from_millis(1)).unwrap();
        std::fs::remove_file(&path).unwrap();
        sink.record_success(0, "host", &ts, Duration::from_millis(2)).unwrap();

        assert_eq!(
            read(&path),
            "[2024-01-01 12:00:00] SUCCESS - Target: host, RTT: 2ms\n"
        );
    }

    #[test]
    fn test_deleted_error_file_is_recreated() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], ErrorLogMode::Error);
        let error_path = temp.path().join("ping.error.log");
        let now = Local::now();

        std::fs::remove_file(&error_path).unwrap();
        sink.record_failure(0, "host", &now, "refused").unwrap();
        assert_eq!(read(&error_path).lines().count(), 1);
    }

    #[test]
    fn test_invalid_index_does_no_io() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], ErrorLogMode::Both);
        let now = Local::now();

        let err = sink
            .record_success(1, "host", &now, Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidIndex { index: 1, len: 1 }));

        let err = sink.record_failure(usize::MAX, "host", &now, "x").unwrap_err();
        assert!(matches!(err, SinkError::InvalidIndex { .. }));

        assert!(read(&temp.path().join("ping.log")).is_empty());
        assert!(read(&temp.path().join("ping.error.log")).is_empty());
    }

    #[test]
    fn test_error_mode_recreates_removed_primary() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], ErrorLogMode::Error);
        let path = temp.path().join("ping.log");

        std::fs::remove_file(&path).unwrap();
        sink.record_failure(0, "host", &Local::now(), "timeout").unwrap();

        assert!(path.exists());
        assert!(read(&path).is_empty());
        assert_eq!(read(&temp.path().join("ping.error.log")).lines().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_both_mode_writes_error_file_when_primary_fails() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["ping.log"], ErrorLogMode::Both);
        let path = temp.path().join("ping.log");

        // A dangling symlink reads as missing and cannot be recreated.
        std::fs::remove_file(&path).unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone").join("ping.log"), &path).unwrap();

        let err = sink
            .record_failure(0, "host", &Local::now(), "timeout")
            .unwrap_err();
        assert!(matches!(err, SinkError::FileRecreate { .. }));
        assert_eq!(read(&temp.path().join("ping.error.log")).lines().count(), 1);
    }

    #[test]
    fn test_open_fails_on_unwritable_path() {
        let temp = TempDir::new().unwrap();
        let paths = vec![
            temp.path().join("ok.log"),
            temp.path().join("missing").join("nested.log"),
        ];
        let err = LogSink::open(&paths, ErrorLogMode::Both).unwrap_err();
        assert!(matches!(err, SinkError::FileOpen { .. }));
    }

    #[test]
    fn test_close_twice() {
        let temp = TempDir::new().unwrap();
        let sink = open_sink(&temp, &["a.log", "b.log"], ErrorLogMode::Both);

        sink.close().unwrap();
        sink.close().unwrap();
        assert!(matches!(
            sink.record_success(0, "a", &Local::now(), Duration::ZERO),
            Err(SinkError::Closed)
        ));
    }
}
