//! Scheduled tasks: notification publishers triggered by the wall clock
//!
//! A [`CronJob`] owns one scheduler thread that sleeps until the next time
//! matching its [`CronSchedule`] and then runs its [`ScheduledTask`] on that
//! thread, so runs of one job never overlap.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Datelike, Local, TimeZone};
use parking_lot::Mutex;

use crate::error::{HtpcError, Result};
use crate::notification::{NotificationCatalog, Notifiable, Notifier};

/// How far ahead `next_after` searches for a matching minute
const MAX_LOOKAHEAD_DAYS: usize = 4 * 366;

/// Body of a periodic job
///
/// `run` is called from the job's scheduler thread. Tasks that keep
/// bookkeeping (dedup caches and the like) own it; [`CronJob::run_now`] may be
/// called concurrently with a scheduled run.
pub trait ScheduledTask: Send + Sync + 'static {
    /// Notifications this task publishes
    fn notifications(&self) -> NotificationCatalog {
        NotificationCatalog::new()
    }

    fn run(&self, notifier: &Notifier);
}

/// One field of a cron schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// `N`
    At(u32),
    /// `*/N`, counted from the field's first value
    Every(u32),
}

impl CronField {
    fn matches(&self, value: u32, first: u32) -> bool {
        match *self {
            CronField::Any => true,
            CronField::At(at) => value == at,
            CronField::Every(step) => (value - first) % step == 0,
        }
    }

    fn check_range(self, field: &str, range: std::ops::RangeInclusive<u32>) -> Result<Self> {
        match self {
            CronField::At(at) if !range.contains(&at) => Err(HtpcError::Scheduler(format!(
                "{} {} is outside {}..={}",
                field,
                at,
                range.start(),
                range.end()
            ))),
            CronField::Every(step) if step > *range.end() => Err(HtpcError::Scheduler(format!(
                "{} step {} is larger than {}",
                field,
                step,
                range.end()
            ))),
            other => Ok(other),
        }
    }
}

impl FromStr for CronField {
    type Err = HtpcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*" {
            return Ok(CronField::Any);
        }
        if let Some(step) = s.strip_prefix("*/") {
            return match step.parse::<u32>() {
                Ok(step) if step > 0 => Ok(CronField::Every(step)),
                _ => Err(HtpcError::Scheduler(format!("Invalid cron step '{}'", s))),
            };
        }
        s.parse::<u32>()
            .map(CronField::At)
            .map_err(|_| HtpcError::Scheduler(format!("Invalid cron field '{}'", s)))
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => f.write_str("*"),
            CronField::At(at) => write!(f, "{}", at),
            CronField::Every(step) => write!(f, "*/{}", step),
        }
    }
}

/// Day-of-month, hour and minute schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    pub day: CronField,
    pub hour: CronField,
    pub minute: CronField,
}

impl CronSchedule {
    pub fn new(day: CronField, hour: CronField, minute: CronField) -> Result<Self> {
        Ok(Self {
            day: day.check_range("day", 1..=31)?,
            hour: hour.check_range("hour", 0..=23)?,
            minute: minute.check_range("minute", 0..=59)?,
        })
    }

    /// Parse the three fields, e.g. `("*", "*/6", "30")`
    pub fn parse(day: &str, hour: &str, minute: &str) -> Result<Self> {
        Self::new(day.parse()?, hour.parse()?, minute.parse()?)
    }

    /// First matching minute strictly after `after`
    ///
    /// Local times skipped by a DST transition are skipped here too.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start = after.naive_local();
        let zone = after.timezone();
        let mut date = start.date();

        for _ in 0..MAX_LOOKAHEAD_DAYS {
            if self.day.matches(date.day(), 1) {
                for hour in (0..24).filter(|h| self.hour.matches(*h, 0)) {
                    for minute in (0..60).filter(|m| self.minute.matches(*m, 0)) {
                        let candidate = date.and_hms_opt(hour, minute, 0)?;
                        if candidate <= start {
                            continue;
                        }
                        if let Some(at) = zone.from_local_datetime(&candidate).earliest() {
                            return Some(at);
                        }
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

impl FromStr for CronSchedule {
    type Err = HtpcError;

    /// Parse `"<day> <hour> <minute>"`
    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        match fields.as_slice() {
            [day, hour, minute] => Self::parse(day, hour, minute),
            _ => Err(HtpcError::Scheduler(format!(
                "Expected '<day> <hour> <minute>', got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.day, self.hour, self.minute)
    }
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// A [`ScheduledTask`] bound to a schedule
pub struct CronJob<T: ScheduledTask> {
    notifier: Notifier,
    schedule: CronSchedule,
    task: Arc<T>,
    worker: Mutex<Option<Worker>>,
}

impl<T: ScheduledTask> CronJob<T> {
    pub fn new(name: impl Into<String>, schedule: CronSchedule, task: T) -> Self {
        let notifier = Notifier::new(name, task.notifications());
        Self {
            notifier,
            schedule,
            task: Arc::new(task),
            worker: Mutex::new(None),
        }
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Run the task once on the calling thread
    pub fn run_now(&self) {
        self.task.run(&self.notifier);
    }

    /// Start the scheduler thread; a second call while running is a no-op
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::debug!(component = %self.name(), "Cron job already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let notifier = self.notifier.clone();
        let schedule = self.schedule;
        let task = Arc::clone(&self.task);

        let handle = thread::Builder::new()
            .name(format!("{}-cron", self.name()))
            .spawn(move || scheduler_loop(notifier, schedule, task, stop_rx))
            .map_err(|e| HtpcError::Scheduler(format!("Failed to spawn scheduler: {}", e)))?;

        tracing::info!(
            component = %self.name(),
            "Cron job scheduled at '{}'",
            self.schedule
        );
        *worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Stop the scheduler thread and wait for a running task to finish
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        drop(worker.stop_tx);
        if worker.handle.thread().id() != thread::current().id() && worker.handle.join().is_err() {
            tracing::error!(component = %self.name(), "Scheduler thread panicked");
        }
    }
}

fn scheduler_loop<T: ScheduledTask>(
    notifier: Notifier,
    schedule: CronSchedule,
    task: Arc<T>,
    stop_rx: mpsc::Receiver<()>,
) {
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            tracing::error!(
                component = %notifier.name(),
                "Schedule '{}' never fires, stopping",
                schedule
            );
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                // recv_timeout may wake marginally early
                if Local::now() < next {
                    continue;
                }
                tracing::debug!(component = %notifier.name(), "Running cron job");
                if panic::catch_unwind(AssertUnwindSafe(|| task.run(&notifier))).is_err() {
                    tracing::error!(component = %notifier.name(), "Cron job run panicked");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

impl<T: ScheduledTask> Notifiable for CronJob<T> {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl<T: ScheduledTask> Drop for CronJob<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    #[rstest]
    #[case("*", CronField::Any)]
    #[case("15", CronField::At(15))]
    #[case("*/5", CronField::Every(5))]
    #[case(" 7 ", CronField::At(7))]
    fn test_parse_field(#[case] input: &str, #[case] expected: CronField) {
        assert_eq!(input.parse::<CronField>().unwrap(), expected);
    }

    #[rstest]
    #[case("*/0")]
    #[case("x")]
    #[case("*/x")]
    #[case("-1")]
    fn test_parse_field_rejects(#[case] input: &str) {
        assert!(input.parse::<CronField>().is_err());
    }

    #[test]
    fn test_schedule_range_checks() {
        assert!(CronSchedule::parse("0", "*", "*").is_err());
        assert!(CronSchedule::parse("*", "24", "*").is_err());
        assert!(CronSchedule::parse("*", "*", "60").is_err());
        assert!(CronSchedule::parse("*", "*/25", "*").is_err());
        assert!("* 3 0".parse::<CronSchedule>().is_ok());
        assert!("* 3".parse::<CronSchedule>().is_err());
    }

    #[test]
    fn test_next_after_same_day() {
        let schedule = CronSchedule::parse("*", "3", "30").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 1, 15, 0).unwrap();
        assert_eq!(
            schedule.next_after(&now),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 3, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_next_after_is_strict() {
        let schedule = CronSchedule::parse("*", "*", "*/15").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 15, 0).unwrap();
        assert_eq!(
            schedule.next_after(&now),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_next_after_rolls_over_month() {
        let schedule = CronSchedule::parse("31", "0", "0").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(&now),
            Some(Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_display_round_trips_fields() {
        let schedule = CronSchedule::parse("*", "*/6", "30").unwrap();
        assert_eq!(schedule.to_string(), "* */6 30");
    }

    proptest::proptest! {
        #[test]
        fn prop_next_after_matches_schedule(
            minute_step in 1u32..60,
            hour in 0u32..24,
            offset_minutes in 0i64..(60 * 24 * 40),
        ) {
            let schedule = CronSchedule::new(
                CronField::Any,
                CronField::At(hour),
                CronField::Every(minute_step),
            ).unwrap();
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let now = base + chrono::Duration::minutes(offset_minutes);

            let next = schedule.next_after(&now).unwrap();
            proptest::prop_assert!(next > now);
            proptest::prop_assert_eq!(chrono::Timelike::hour(&next), hour);
            proptest::prop_assert_eq!(chrono::Timelike::minute(&next) % minute_step, 0);
            proptest::prop_assert!(next - now <= chrono::Duration::days(1));
        }
    }
}
