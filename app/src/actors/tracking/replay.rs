//! Recorded tracking: replays landmark frames from a JSON-lines file, one
//! tracker results object per line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::time::Duration;

use climbar::LandmarkFrame;

use super::{TrackingSource, frame_wait};

pub struct ReplayTracking {
    pub path: PathBuf,
    pub fps: u32,
    pub looped: bool,
}

/// Parse a recording. Blank lines are skipped; malformed lines are logged
/// and skipped.
pub fn parse_frames(text: &str) -> Vec<LandmarkFrame> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("tracking replay: line {}: {e}", n + 1);
                None
            }
        })
        .collect()
}

fn load_frames(path: &Path) -> Option<Vec<LandmarkFrame>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(parse_frames(&text)),
        Err(e) => {
            tracing::warn!("tracking replay: failed to read {}: {e}", path.display());
            None
        }
    }
}

impl TrackingSource for ReplayTracking {
    fn run(self: Box<Self>, tx: Sender<LandmarkFrame>, stop: Arc<AtomicBool>) {
        let Some(frames) = load_frames(&self.path) else {
            return;
        };
        if frames.is_empty() {
            tracing::warn!("tracking replay: {} has no frames", self.path.display());
            return;
        }
        tracing::info!(
            "tracking replay: {} frames from {}",
            frames.len(),
            self.path.display()
        );
        let period = Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)));
        loop {
            for frame in &frames {
                if !frame_wait(period, &stop) || tx.send(frame.clone()).is_err() {
                    return;
                }
            }
            if !self.looped {
                return;
            }
        }
    }
}
