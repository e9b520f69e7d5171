//! Explicit repeating-task handle, polled by the owner's frame loop.

use chrono::{DateTime, TimeDelta, Utc};

/// A task that is due every `period` once started, until cancelled.
///
/// The owner calls [`RepeatingTask::poll`] from its own loop; a poll that
/// returns `true` means "run the task now". Missed periods collapse into a
/// single run, so a stalled loop never produces a burst.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatingTask {
    period: TimeDelta,
    next_due: Option<DateTime<Utc>>,
}

impl RepeatingTask {
    pub fn new(period: TimeDelta) -> Self {
        Self {
            period: period.max(TimeDelta::milliseconds(1)),
            next_due: None,
        }
    }

    /// A task running `hz` times per second (at least once per second).
    pub fn from_rate_hz(hz: u32) -> Self {
        Self::new(TimeDelta::milliseconds(1000 / i64::from(hz.max(1))))
    }

    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Start (or restart) the task; the first run is due immediately.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.next_due = Some(now);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.period);
                true
            }
            _ => false,
        }
    }
}
