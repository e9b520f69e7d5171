//! Simulated tracking: two hands wandering over the frame on Lissajous
//! curves. No camera needed; used for demos and for exercising a stage
//! surface end to end.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::time::Duration;

use climbar::{Landmark, LandmarkFrame};

use super::{TrackingSource, frame_wait};

/// Landmarks per simulated hand (wrist plus finger tips).
const HAND_POINTS: usize = 5;

pub struct SimulatedTracking {
    period: Duration,
    phase: f64,
}

impl SimulatedTracking {
    pub fn new(fps: u32, seed: u64) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            phase: seed_phase(seed),
        }
    }

    /// Frame at time `t` seconds. Pure, so runs are reproducible.
    pub fn frame_at(&self, t: f64) -> LandmarkFrame {
        let p = self.phase;
        let right = hand(
            0.5 + 0.35 * (0.31 * t + p).sin(),
            0.5 + 0.35 * (0.47 * t + 2.0 * p).sin(),
        );
        let left = hand(
            0.5 + 0.35 * (0.23 * t + 3.0 * p).cos(),
            0.5 + 0.35 * (0.41 * t + p).cos(),
        );
        let pose = vec![right[0], left[0]];
        LandmarkFrame {
            pose_landmarks: pose,
            left_hand_landmarks: left,
            right_hand_landmarks: right,
        }
    }
}

fn seed_phase(seed: u64) -> f64 {
    let mixed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((mixed >> 33) % 6283) as f64 / 1000.0
}

/// Wrist at `(x, y)` with finger tips fanned out above it.
fn hand(x: f64, y: f64) -> Vec<Landmark> {
    let mut points = Vec::with_capacity(HAND_POINTS);
    points.push(Landmark::new(x, y));
    for i in 1..HAND_POINTS {
        let dx = (i as f64 - 2.5) * 0.012;
        points.push(Landmark::new(
            (x + dx).clamp(0.0, 1.0),
            (y - 0.05).clamp(0.0, 1.0),
        ));
    }
    points
}

impl TrackingSource for SimulatedTracking {
    fn run(self: Box<Self>, tx: Sender<LandmarkFrame>, stop: Arc<AtomicBool>) {
        let mut t = 0.0;
        let dt = self.period.as_secs_f64();
        while frame_wait(self.period, &stop) {
            if tx.send(self.frame_at(t)).is_err() {
                return;
            }
            t += dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_reproducible_per_seed() {
        let a = SimulatedTracking::new(30, 42);
        let b = SimulatedTracking::new(30, 42);
        let c = SimulatedTracking::new(30, 43);
        assert_eq!(a.frame_at(1.5), b.frame_at(1.5));
        assert_ne!(a.frame_at(1.5), c.frame_at(1.5));
    }

    #[test]
    fn points_stay_normalized() {
        let sim = SimulatedTracking::new(30, 9);
        for step in 0..500 {
            let frame = sim.frame_at(step as f64 * 0.1);
            assert_eq!(frame.right_hand_landmarks.len(), HAND_POINTS);
            assert_eq!(frame.left_hand_landmarks.len(), HAND_POINTS);
            for lm in frame
                .pose_landmarks
                .iter()
                .chain(&frame.left_hand_landmarks)
                .chain(&frame.right_hand_landmarks)
            {
                assert!((0.0..=1.0).contains(&lm.x) && (0.0..=1.0).contains(&lm.y));
            }
        }
    }
}
