//! Per-frame collision algorithm: landmark frame + session -> touch.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_POINT_RADIUS, GameSession, Hand, LandmarkFrame, TargetId, Viewport};

/// How the newest target (highest id) is allowed to be touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum LastTargetRule {
    /// Any single landmark point will do, like every other target.
    #[default]
    AnyPoint,
    /// Both hands must overlap the target in the same frame.
    BothHands,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionDetector {
    pub point_radius: f64,
    pub viewport: Viewport,
    pub last_target_rule: LastTargetRule,
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self {
            point_radius: DEFAULT_POINT_RADIUS,
            viewport: Viewport::default(),
            last_target_rule: LastTargetRule::default(),
        }
    }
}

impl CollisionDetector {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    /// Find the one target this frame touches, if any.
    ///
    /// Only a running session is scanned. Untouched targets are checked in
    /// ascending id order and the scan ends at the first hit. The rule for
    /// the newest target holds whatever order the others were touched in.
    pub fn detect(&self, frame: &LandmarkFrame, session: &GameSession) -> Option<TargetId> {
        if !session.is_running() || frame.is_empty() {
            return None;
        }
        let newest = session.targets().iter().map(|t| t.id).max();
        let mut untouched: Vec<_> = session.targets().iter().filter(|t| !t.touched).collect();
        untouched.sort_by_key(|t| t.id);

        untouched.into_iter().find_map(|target| {
            let both_hands = self.last_target_rule == LastTargetRule::BothHands
                && Some(target.id) == newest;
            let hit = if both_hands {
                let right = frame
                    .hand_points(Hand::Right, self.viewport)
                    .any(|p| target.hit(p, self.point_radius));
                right
                    && frame
                        .hand_points(Hand::Left, self.viewport)
                        .any(|p| target.hit(p, self.point_radius))
            } else {
                frame
                    .points(self.viewport)
                    .any(|p| target.hit(p, self.point_radius))
            };
            hit.then_some(target.id)
        })
    }

    /// Whether any point of the frame overlaps the start checkpoint. Runs
    /// regardless of the session state.
    pub fn checkpoint_hit(&self, frame: &LandmarkFrame, session: &GameSession) -> bool {
        frame
            .points(self.viewport)
            .any(|p| session.checkpoint.hit(p, self.point_radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckpointTiming, CircleGeometry, Landmark, Point, ScoreGeometry, StartCheckpoint};
    use chrono::{DateTime, Utc};

    const VIEW: Viewport = Viewport {
        width: 1000.0,
        height: 1000.0,
    };

    fn session_with(centers: &[(f64, f64)]) -> GameSession {
        let checkpoint = StartCheckpoint::new(
            CircleGeometry::new(Point::new(900.0, 900.0), 30.0),
            CheckpointTiming::default(),
        );
        let mut s = GameSession::new(checkpoint, ScoreGeometry { x: 0.0, y: 0.0 });
        for &(x, y) in centers {
            s.add_target(CircleGeometry::new(Point::new(x, y), 30.0));
        }
        s
    }

    fn pose(points: &[(f64, f64)]) -> LandmarkFrame {
        LandmarkFrame {
            pose_landmarks: points
                .iter()
                .map(|&(x, y)| Landmark::new(x / VIEW.width, y / VIEW.height))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn idle_session_is_not_scanned() {
        let s = session_with(&[(100.0, 100.0)]);
        let detector = CollisionDetector::new(VIEW);
        assert_eq!(detector.detect(&pose(&[(100.0, 100.0)]), &s), None);
    }

    #[test]
    fn lowest_untouched_id_wins() {
        let mut s = session_with(&[(100.0, 100.0), (100.0, 100.0), (500.0, 500.0)]);
        s.start(DateTime::<Utc>::UNIX_EPOCH);
        let detector = CollisionDetector::new(VIEW);
        let frame = pose(&[(500.0, 500.0), (100.0, 100.0)]);

        assert_eq!(detector.detect(&frame, &s), Some(1));
        s.touch(1, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(detector.detect(&frame, &s), Some(2));
    }

    #[test]
    fn empty_frame_hits_nothing() {
        let mut s = session_with(&[(100.0, 100.0)]);
        s.start(DateTime::<Utc>::UNIX_EPOCH);
        let detector = CollisionDetector::new(VIEW);
        assert_eq!(detector.detect(&LandmarkFrame::default(), &s), None);
    }

    #[test]
    fn both_hands_rule_applies_to_last_target_only() {
        let mut s = session_with(&[(100.0, 100.0), (500.0, 500.0)]);
        s.start(DateTime::<Utc>::UNIX_EPOCH);
        let detector = CollisionDetector {
            last_target_rule: LastTargetRule::BothHands,
            ..CollisionDetector::new(VIEW)
        };

        let one_hand = LandmarkFrame {
            right_hand_landmarks: vec![Landmark::new(0.1, 0.1), Landmark::new(0.5, 0.5)],
            ..Default::default()
        };
        // Target 1 is not the newest, a single hand is enough.
        assert_eq!(detector.detect(&one_hand, &s), Some(1));
        s.touch(1, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(detector.detect(&one_hand, &s), None);

        let both_hands = LandmarkFrame {
            left_hand_landmarks: vec![Landmark::new(0.5, 0.5)],
            ..one_hand
        };
        assert_eq!(detector.detect(&both_hands, &s), Some(2));
    }

    #[test]
    fn newest_target_needs_both_hands_even_when_touched_first() {
        let mut s = session_with(&[(100.0, 100.0), (500.0, 500.0)]);
        s.start(DateTime::<Utc>::UNIX_EPOCH);
        let detector = CollisionDetector {
            last_target_rule: LastTargetRule::BothHands,
            ..CollisionDetector::new(VIEW)
        };

        let right_only = LandmarkFrame {
            right_hand_landmarks: vec![Landmark::new(0.5, 0.5)],
            ..Default::default()
        };
        assert_eq!(detector.detect(&right_only, &s), None);

        let both_hands = LandmarkFrame {
            left_hand_landmarks: vec![Landmark::new(0.5, 0.5)],
            ..right_only
        };
        assert_eq!(detector.detect(&both_hands, &s), Some(2));
        s.touch(2, DateTime::<Utc>::UNIX_EPOCH).unwrap();

        let first_target = LandmarkFrame {
            right_hand_landmarks: vec![Landmark::new(0.1, 0.1)],
            ..Default::default()
        };
        assert_eq!(detector.detect(&first_target, &s), Some(1));
    }

    #[test]
    fn checkpoint_is_checked_while_idle() {
        let s = session_with(&[]);
        let detector = CollisionDetector::new(VIEW);
        assert!(detector.checkpoint_hit(&pose(&[(910.0, 880.0)]), &s));
        assert!(!detector.checkpoint_hit(&pose(&[(10.0, 10.0)]), &s));
    }
}
