//! Game session: the in-memory game state owned by one process.
//!
//! Pure state holder, no I/O. Callers pass the current time in so the
//! session can be driven by any clock.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use crate::{CircleGeometry, GameError, ScoreGeometry, StartCheckpoint, Target, TargetId};

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Session score accumulator. Never negative; only reset clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score(u32);

impl Score {
    pub fn value(self) -> u32 {
        self.0
    }

    pub fn add(&mut self, weight: u32) {
        self.0 = self.0.saturating_add(weight);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

// ---------------------------------------------------------------------------
// Touch outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchOutcome {
    /// The target went untouched -> touched with this call.
    pub newly_touched: bool,
    /// The touch completed the set and stopped a running session.
    pub auto_stopped: bool,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GameSession {
    targets: Vec<Target>,
    next_id: TargetId,
    score: Score,
    running: bool,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    pub checkpoint: StartCheckpoint,
    pub score_geometry: ScoreGeometry,
}

impl GameSession {
    pub fn new(checkpoint: StartCheckpoint, score_geometry: ScoreGeometry) -> Self {
        Self {
            targets: Vec::new(),
            next_id: 1,
            score: Score::default(),
            running: false,
            started_at: None,
            stopped_at: None,
            checkpoint,
            score_geometry,
        }
    }

    /// Targets in creation order (which is also ascending id order).
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.id == id)
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    pub fn all_touched(&self) -> bool {
        !self.targets.is_empty() && self.targets.iter().all(|t| t.touched)
    }

    /// Create a target with the next id from the session counter.
    pub fn add_target(&mut self, geometry: CircleGeometry) -> &Target {
        let id = self.next_id;
        self.next_id += 1;
        self.targets.push(Target::new(id, geometry));
        &self.targets[self.targets.len() - 1]
    }

    pub fn remove_target(&mut self, id: TargetId) -> Result<Target, GameError> {
        let pos = self
            .targets
            .iter()
            .position(|t| t.id == id)
            .ok_or(GameError::UnknownTarget(id))?;
        Ok(self.targets.remove(pos))
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.running = true;
        self.started_at = Some(now);
        self.stopped_at = None;
        info!("session started with {} targets", self.targets.len());
    }

    /// Stop a running session. Stopping an idle session changes nothing, so
    /// the recorded elapsed time stays where it was.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        self.running = false;
        self.stopped_at = Some(now);
        info!(
            "session stopped, score {} in {}ms",
            self.score.value(),
            self.elapsed_time(now).num_milliseconds()
        );
    }

    /// Clear touched flags, score and timestamps. Targets are kept.
    pub fn reset_game(&mut self) {
        for target in &mut self.targets {
            target.touched = false;
        }
        self.score.reset();
        self.running = false;
        self.started_at = None;
        self.stopped_at = None;
    }

    /// Drop every target. Ids keep counting up so a late message for an
    /// old target never lands on a new one.
    pub fn reset_circles(&mut self) {
        self.targets.clear();
    }

    /// Mark a target touched. The first touch adds its weight to the score;
    /// touching the last untouched target of a running session stops it.
    pub fn touch(&mut self, id: TargetId, now: DateTime<Utc>) -> Result<TouchOutcome, GameError> {
        let target = self.target_mut(id).ok_or(GameError::UnknownTarget(id))?;
        if target.touched {
            return Ok(TouchOutcome {
                newly_touched: false,
                auto_stopped: false,
            });
        }
        target.touched = true;
        let weight = target.weight;
        self.score.add(weight);

        let auto_stopped = self.running && self.all_touched();
        if auto_stopped {
            info!("all targets touched");
            self.stop(now);
        }
        Ok(TouchOutcome {
            newly_touched: true,
            auto_stopped,
        })
    }

    /// Zero before the first start, `now - started_at` while running and
    /// `stopped_at - started_at` once stopped.
    pub fn elapsed_time(&self, now: DateTime<Utc>) -> TimeDelta {
        match (self.started_at, self.stopped_at) {
            (None, _) => TimeDelta::zero(),
            (Some(start), Some(stop)) => stop - start,
            (Some(start), None) if self.running => now - start,
            (Some(_), None) => TimeDelta::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckpointTiming, Point};
    use proptest::prelude::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)
    }

    fn session() -> GameSession {
        let checkpoint = StartCheckpoint::new(
            CircleGeometry::new(Point::new(50.0, 50.0), 30.0),
            CheckpointTiming::default(),
        );
        GameSession::new(checkpoint, ScoreGeometry { x: 10.0, y: 10.0 })
    }

    fn circle() -> CircleGeometry {
        CircleGeometry::new(Point::new(0.0, 0.0), 30.0)
    }

    #[test]
    fn ids_are_sequential_and_not_renumbered() {
        let mut s = session();
        for _ in 0..3 {
            s.add_target(circle());
        }
        s.remove_target(2).unwrap();
        let ids: Vec<TargetId> = s.targets().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // The counter never hands out an id twice.
        assert_eq!(s.add_target(circle()).id, 4);
    }

    #[test]
    fn reset_circles_keeps_numbering() {
        let mut s = session();
        s.add_target(circle());
        s.add_target(circle());
        s.reset_circles();
        assert!(s.targets().is_empty());
        assert_eq!(s.add_target(circle()).id, 3);
    }

    #[test]
    fn remove_unknown_target_fails() {
        let mut s = session();
        assert_eq!(s.remove_target(9), Err(GameError::UnknownTarget(9)));
    }

    #[test]
    fn start_and_stop_record_timestamps() {
        let mut s = session();
        s.start(at(100));
        assert!(s.is_running());
        assert_eq!(s.started_at(), Some(at(100)));
        assert_eq!(s.stopped_at(), None);

        s.stop(at(400));
        assert!(!s.is_running());
        assert_eq!(s.stopped_at(), Some(at(400)));

        // A second stop does not move the stop time.
        s.stop(at(900));
        assert_eq!(s.stopped_at(), Some(at(400)));

        s.start(at(1000));
        assert_eq!(s.stopped_at(), None);
    }

    #[test]
    fn elapsed_time_freezes_after_stop() {
        let mut s = session();
        assert_eq!(s.elapsed_time(at(5000)), TimeDelta::zero());

        s.start(at(1000));
        assert_eq!(s.elapsed_time(at(1500)).num_milliseconds(), 500);
        assert_eq!(s.elapsed_time(at(2500)).num_milliseconds(), 1500);

        s.stop(at(3000));
        assert_eq!(s.elapsed_time(at(3000)).num_milliseconds(), 2000);
        assert_eq!(s.elapsed_time(at(60_000)).num_milliseconds(), 2000);
    }

    #[test]
    fn touch_scores_once_and_auto_stops() {
        let mut s = session();
        s.add_target(circle());
        s.add_target(circle());
        s.start(at(0));

        let first = s.touch(1, at(10)).unwrap();
        assert!(first.newly_touched);
        assert!(!first.auto_stopped);
        assert_eq!(s.score().value(), 1);

        let again = s.touch(1, at(20)).unwrap();
        assert!(!again.newly_touched);
        assert_eq!(s.score().value(), 1);

        let last = s.touch(2, at(30)).unwrap();
        assert!(last.auto_stopped);
        assert!(!s.is_running());
        assert_eq!(s.elapsed_time(at(99)).num_milliseconds(), 30);
    }

    #[test]
    fn touch_uses_target_weight() {
        let mut s = session();
        s.add_target(circle());
        s.add_target(circle());
        s.target_mut(2).unwrap().weight = 5;
        s.start(at(0));
        s.touch(2, at(1)).unwrap();
        assert_eq!(s.score().value(), 5);
    }

    #[test]
    fn touch_while_idle_does_not_stop_anything() {
        let mut s = session();
        s.add_target(circle());
        let outcome = s.touch(1, at(0)).unwrap();
        assert!(outcome.newly_touched);
        assert!(!outcome.auto_stopped);
        assert_eq!(s.stopped_at(), None);
    }

    #[test]
    fn reset_game_keeps_targets() {
        let mut s = session();
        s.add_target(circle());
        s.add_target(circle());
        s.start(at(0));
        s.touch(1, at(5)).unwrap();
        s.reset_game();

        assert_eq!(s.targets().len(), 2);
        assert!(s.targets().iter().all(|t| !t.touched));
        assert_eq!(s.score().value(), 0);
        assert!(!s.is_running());
        assert_eq!(s.elapsed_time(at(100)), TimeDelta::zero());
    }

    proptest! {
        #[test]
        fn touched_flags_and_score_never_go_backwards(
            touches in proptest::collection::vec(1u32..6, 0..40),
        ) {
            let mut s = session();
            for _ in 0..5 {
                s.add_target(circle());
            }
            s.start(at(0));
            let mut score = 0;
            let mut touched = vec![false; 5];
            for (i, id) in touches.into_iter().enumerate() {
                s.touch(id, at(i as i64)).unwrap();
                prop_assert!(s.score().value() >= score);
                score = s.score().value();
                for t in s.targets() {
                    let idx = (t.id - 1) as usize;
                    prop_assert!(t.touched || !touched[idx]);
                    touched[idx] = t.touched;
                }
            }
        }
    }
}
