//! Upload schedule parsing and the background schedule runner.
//!
//! Two syntaxes are accepted: a cron expression (six fields with seconds, or
//! the classic five-field form which runs at second 0) and a legacy daily
//! `HH:MM` time. The legacy time is turned into a daily cron expression once,
//! at setup; [`next_daily_instant`] exists only to answer "when is the next
//! upload" for a caller.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Timelike};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScheduleError;

/// Format of the legacy daily upload time.
const DAILY_TIME_FORMAT: &str = "%H:%M";

/// A validated-on-compile upload schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Cron expression as configured.
    Cron(String),
    /// Legacy `HH:MM` daily upload time.
    Daily(NaiveTime),
}

impl ScheduleSpec {
    /// Pick the schedule from the two config settings.
    ///
    /// A non-empty cron expression wins over `upload_time`. Returns `None`
    /// when both are empty.
    pub fn from_settings(schedule: &str, upload_time: &str) -> Result<Option<Self>, ScheduleError> {
        let schedule = schedule.trim();
        if !schedule.is_empty() {
            return Ok(Some(Self::Cron(schedule.to_string())));
        }
        let upload_time = upload_time.trim();
        if upload_time.is_empty() {
            return Ok(None);
        }
        parse_daily_time(upload_time).map(|time| Some(Self::Daily(time)))
    }

    /// The six-field cron expression this schedule runs on.
    pub fn cron_expression(&self) -> String {
        match self {
            Self::Cron(expression) => normalize_cron(expression),
            Self::Daily(time) => format!("0 {} {} * * *", time.minute(), time.hour()),
        }
    }

    /// Parse the schedule, failing before anything is started.
    pub fn compile(&self) -> Result<Schedule, ScheduleError> {
        let expression = self.cron_expression();
        Schedule::from_str(&expression).map_err(|source| ScheduleError::Validation {
            expression,
            source,
        })
    }
}

/// Prefix a classic five-field expression with a zero seconds field.
fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

/// Parse a legacy `HH:MM` upload time.
pub fn parse_daily_time(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), DAILY_TIME_FORMAT).map_err(|source| {
        ScheduleError::TimeFormat {
            value: value.to_string(),
            source,
        }
    })
}

/// The next instant matching a daily `HH:MM` time, relative to `now`.
///
/// Today's instant is returned if it is strictly after `now`; otherwise it is
/// pushed forward by exactly 24 hours.
pub fn next_daily_instant<Tz: TimeZone>(
    value: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, ScheduleError> {
    let time = parse_daily_time(value)?;
    let naive = now.date_naive().and_time(time);
    let today = now
        .timezone()
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ScheduleError::NonexistentLocalTime {
            value: value.to_string(),
        })?;

    if today <= *now {
        Ok(today + TimeDelta::hours(24))
    } else {
        Ok(today)
    }
}

/// Runs a job on a cron schedule in a background task until stopped.
///
/// Dropping the scheduler also stops it.
#[derive(Debug)]
pub struct Scheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the schedule loop on the current tokio runtime.
    pub fn spawn<F, Fut>(schedule: Schedule, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(schedule, job, cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Compile `spec` and spawn it.
    pub fn start<F, Fut>(spec: &ScheduleSpec, job: F) -> Result<Self, ScheduleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let schedule = spec.compile()?;
        info!(schedule = %spec.cron_expression(), "Upload schedule registered");
        Ok(Self::spawn(schedule, job))
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the loop to stop. No new job starts after this returns; one
    /// that is already running finishes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for a job that is already running to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_schedule<F, Fut>(schedule: Schedule, job: F, cancel: CancellationToken)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // Guards against firing twice for one slot if the wall clock lags the timer.
    let mut last_fired: Option<DateTime<Local>> = None;

    loop {
        let now = Local::now();
        let from = match last_fired {
            Some(last) if last > now => last,
            _ => now,
        };
        let Some(next) = schedule.after(&from).next() else {
            debug!("Schedule has no further occurrences");
            break;
        };
        let delay = (next - Local::now()).to_std().unwrap_or_default();
        debug!(next = %next, "Next scheduled upload");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        // The sleep may have finished just as stop was called.
        if cancel.is_cancelled() {
            break;
        }
        last_fired = Some(next);
        job().await;
    }

    debug!("Schedule loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_cron_takes_precedence() {
        let spec = ScheduleSpec::from_settings("0 30 2 * * *", "12:00").unwrap();
        assert_eq!(spec, Some(ScheduleSpec::Cron("0 30 2 * * *".to_string())));
    }

    #[test]
    fn test_daily_time_becomes_cron() {
        let spec = ScheduleSpec::from_settings("", "07:05").unwrap().unwrap();
        assert_eq!(spec.cron_expression(), "0 5 7 * * *");
        spec.compile().unwrap();
    }

    #[test]
    fn test_no_schedule() {
        assert_eq!(ScheduleSpec::from_settings(" ", "").unwrap(), None);
    }

    #[test]
    fn test_five_field_cron_is_normalized() {
        let spec = ScheduleSpec::Cron("30 2 * * *".to_string());
        assert_eq!(spec.cron_expression(), "0 30 2 * * *");
        spec.compile().unwrap();
    }

    #[test]
    fn test_invalid_cron_is_rejected_at_compile() {
        let spec = ScheduleSpec::Cron("not a cron".to_string());
        assert!(matches!(
            spec.compile(),
            Err(ScheduleError::Validation { .. })
        ));
    }

    #[test]
    fn test_invalid_daily_time() {
        for value in ["", "noon", "24:00", "12:60", "12-30"] {
            assert!(
                matches!(parse_daily_time(value), Err(ScheduleError::TimeFormat { .. })),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_next_daily_instant_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        let next = next_daily_instant("00:00", &now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_daily_instant_equal_to_now_rolls_forward() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let next = next_daily_instant("00:00", &now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_daily_instant_later_today() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 12, 31, 8, 15, 30).unwrap();
        let next = next_daily_instant("08:16", &now).unwrap();
        assert_eq!(next, tz.with_ymd_and_hms(2024, 12, 31, 8, 16, 0).unwrap());
    }

    #[test]
    fn test_next_daily_instant_bad_input() {
        let now = Utc::now();
        assert!(matches!(
            next_daily_instant("8 o'clock", &now),
            Err(ScheduleError::TimeFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_scheduler_fires_and_stops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let spec = ScheduleSpec::Cron("* * * * * *".to_string());

        let scheduler = Scheduler::start(&spec, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await;

        let after_stop = fired.load(Ordering::SeqCst);
        assert!(after_stop >= 1, "expected at least one firing, got {after_stop}");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_stopped_scheduler_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let spec = ScheduleSpec::Cron("* * * * * *".to_string());

        let scheduler = Scheduler::start(&spec, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        scheduler.stop();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_expression() {
        let spec = ScheduleSpec::Cron("61 * * * * *".to_string());
        let result = Scheduler::start(&spec, || async {});
        assert!(matches!(result, Err(ScheduleError::Validation { .. })));
    }
}
