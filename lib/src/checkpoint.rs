//! Start checkpoint: a singleton circle whose sustained touch fires a
//! one-shot "start / reset game" trigger.
//!
//! Trigger rules, evaluated once per frame:
//!
//! * the touch baseline (`last_touched_at`) moves when the checkpoint goes
//!   untouched -> touched and when it goes touched -> untouched;
//! * if more than `timeout` has passed since the last activation, both
//!   timestamps are reset to `now`, discarding stale touch state;
//! * `active` is true iff the checkpoint is touched and at least `hold` has
//!   passed since the baseline.
//!
//! `active` is never cleared by the checkpoint itself between evaluations;
//! the consumer calls [`StartCheckpoint::rearm`] after acting on it.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{CheckpointPhase, CheckpointState, CircleGeometry, Point};

/// Continuous touch needed before the checkpoint fires.
pub const DEFAULT_HOLD_MS: i64 = 2000;
/// Time since last activation after which touch state is considered stale.
pub const DEFAULT_TIMEOUT_MS: i64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointTiming {
    pub hold: TimeDelta,
    pub timeout: TimeDelta,
}

impl Default for CheckpointTiming {
    fn default() -> Self {
        Self {
            hold: TimeDelta::milliseconds(DEFAULT_HOLD_MS),
            timeout: TimeDelta::milliseconds(DEFAULT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCheckpoint {
    pub touched: bool,
    pub active: bool,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub last_activated_at: Option<DateTime<Utc>>,
    pub geometry: CircleGeometry,
    #[serde(skip)]
    timing: CheckpointTiming,
}

impl StartCheckpoint {
    pub fn new(geometry: CircleGeometry, timing: CheckpointTiming) -> Self {
        Self {
            touched: false,
            active: false,
            last_touched_at: None,
            last_activated_at: None,
            geometry,
            timing,
        }
    }

    pub fn timing(&self) -> CheckpointTiming {
        self.timing
    }

    pub fn state(&self) -> CheckpointState {
        CheckpointState {
            touched: self.touched,
            active: self.active,
        }
    }

    pub fn phase(&self) -> CheckpointPhase {
        self.state().into()
    }

    pub fn hit(&self, point: Point, point_radius: f64) -> bool {
        self.geometry.hit(point, point_radius)
    }

    pub fn set_touched(&mut self, now: DateTime<Utc>) {
        if !self.touched {
            self.touched = true;
            self.last_touched_at = Some(now);
        }
    }

    pub fn set_untouched(&mut self, now: DateTime<Utc>) {
        if self.touched {
            self.touched = false;
            self.last_touched_at = Some(now);
        }
    }

    /// One frame evaluation: update the touch flag from `hit`, then run the
    /// trigger check.
    pub fn evaluate(&mut self, hit: bool, now: DateTime<Utc>) -> CheckpointState {
        if hit {
            self.set_touched(now);
        } else {
            self.set_untouched(now);
        }
        self.check_trigger(now);
        self.state()
    }

    pub fn check_trigger(&mut self, now: DateTime<Utc>) {
        let activated_at = *self.last_activated_at.get_or_insert(now);
        self.last_touched_at.get_or_insert(now);

        if now - activated_at > self.timing.timeout {
            self.last_touched_at = Some(now);
            self.last_activated_at = Some(now);
        }

        let touched_at = self.last_touched_at.unwrap_or(now);
        if self.touched && now - touched_at >= self.timing.hold {
            self.active = true;
            self.last_activated_at = Some(now);
        } else {
            self.active = false;
        }
    }

    /// Reset the touch baseline after the consumer acted on an activation.
    /// A new trigger needs another full `hold` of continuous touch.
    pub fn rearm(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.last_touched_at = Some(now);
        self.last_activated_at = Some(now);
    }

    /// Adopt flags received from a peer replica. Returns `true` on a rising
    /// `active` edge, which the caller treats as an activation.
    pub fn apply_remote(&mut self, state: CheckpointState, now: DateTime<Utc>) -> bool {
        let rising = state.active && !self.active;
        self.active = state.active;
        if state.touched {
            self.set_touched(now);
        } else {
            self.set_untouched(now);
        }
        rising
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)
    }

    fn checkpoint() -> StartCheckpoint {
        StartCheckpoint::new(
            CircleGeometry::new(Point::new(100.0, 100.0), 30.0),
            CheckpointTiming::default(),
        )
    }

    #[test]
    fn sustained_touch_activates_at_hold() {
        let mut cp = checkpoint();
        let mut t = 0;
        while t < 2000 {
            let state = cp.evaluate(true, at(t));
            assert!(!state.active, "fired early at {t}ms");
            t += 33;
        }
        assert!(cp.evaluate(true, at(2000)).active);
        assert_eq!(cp.phase(), CheckpointPhase::Active);
    }

    #[test]
    fn gap_in_touch_restarts_hold() {
        let mut cp = checkpoint();
        cp.evaluate(true, at(0));
        cp.evaluate(true, at(1500));
        cp.evaluate(false, at(1600));
        cp.evaluate(true, at(1700));
        assert!(!cp.evaluate(true, at(2100)).active);
        assert!(!cp.evaluate(true, at(3600)).active);
        assert!(cp.evaluate(true, at(3700)).active);
    }

    #[test]
    fn untouched_is_idle_and_inactive() {
        let mut cp = checkpoint();
        for t in (0..10_000).step_by(100) {
            let state = cp.evaluate(false, at(t));
            assert_eq!(state, CheckpointState::default());
        }
        assert_eq!(cp.phase(), CheckpointPhase::Idle);
    }

    #[test]
    fn stale_baseline_is_discarded_by_timeout() {
        let mut cp = checkpoint();
        // Baselines recorded long ago while nothing happened.
        cp.last_touched_at = Some(at(0));
        cp.last_activated_at = Some(at(0));
        cp.touched = true;
        // Touch state is 9s old but the activation watchdog resets it first.
        assert!(!cp.evaluate(true, at(9000)).active);
        assert_eq!(cp.last_touched_at, Some(at(9000)));
        assert_eq!(cp.last_activated_at, Some(at(9000)));
        assert!(cp.evaluate(true, at(11_000)).active);
    }

    #[test]
    fn active_stays_while_touched_until_rearmed() {
        let mut cp = checkpoint();
        cp.evaluate(true, at(0));
        assert!(cp.evaluate(true, at(2000)).active);
        // Nothing clears it while the touch continues.
        assert!(cp.evaluate(true, at(2033)).active);

        cp.rearm(at(2033));
        assert!(!cp.active);
        assert!(!cp.evaluate(true, at(2066)).active);
        assert!(cp.evaluate(true, at(4033)).active);
    }

    #[test]
    fn releasing_clears_active() {
        let mut cp = checkpoint();
        cp.evaluate(true, at(0));
        assert!(cp.evaluate(true, at(2000)).active);
        let state = cp.evaluate(false, at(2100));
        assert!(!state.active);
        assert!(!state.touched);
    }

    #[test]
    fn remote_rising_edge_is_reported_once() {
        let mut cp = checkpoint();
        let active = CheckpointState {
            touched: true,
            active: true,
        };
        assert!(cp.apply_remote(active, at(0)));
        assert!(!cp.apply_remote(active, at(10)));
        assert!(!cp.apply_remote(CheckpointState::default(), at(20)));
        assert!(!cp.touched);
        assert!(!cp.active);
    }
}
