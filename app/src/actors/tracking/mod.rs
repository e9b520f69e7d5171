//! Landmark frame sources.
//!
//! A [`TrackingSource`] runs on its own thread and delivers [`LandmarkFrame`]s
//! over an `mpsc` channel. The surface actor holds a [`TrackingEngine`],
//! which loads and closes a source and drains whatever frames arrived since
//! the last loop iteration. Consumers don't know whether frames come from the
//! simulator or a recording.

pub mod replay;
pub mod sim;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use climbar::{ClimbarConfig, GameError, LandmarkFrame, ReplayTrackingSection, SimTrackingSection};

use crate::state::config::global_id;

const DEFAULT_FPS: u32 = 30;

/// Anything that can deliver landmark frames over a channel until `stop` is
/// set or the receiving end goes away.
pub trait TrackingSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<LandmarkFrame>, stop: Arc<AtomicBool>);
}

/// Where frames come from, resolved from config. A new source is built from
/// it on every load.
#[derive(Debug, Clone)]
pub enum TrackingSpec {
    Sim {
        id: String,
        section: SimTrackingSection,
    },
    Replay {
        id: String,
        section: ReplayTrackingSection,
    },
}

impl TrackingSpec {
    /// First configured source, simulated sources before recordings.
    pub fn from_config(config: &ClimbarConfig) -> Option<Self> {
        let mut sims: Vec<_> = config.sim_tracking.iter().collect();
        sims.sort_by(|a, b| a.0.cmp(b.0));
        if let Some((index, section)) = sims.first() {
            return Some(Self::Sim {
                id: global_id("sim_tracking", index),
                section: (*section).clone(),
            });
        }
        let mut replays: Vec<_> = config.replay_tracking.iter().collect();
        replays.sort_by(|a, b| a.0.cmp(b.0));
        replays.first().map(|(index, section)| Self::Replay {
            id: global_id("replay_tracking", index),
            section: (*section).clone(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Sim { id, .. } | Self::Replay { id, .. } => id,
        }
    }

    fn build(&self) -> Box<dyn TrackingSource> {
        match self {
            Self::Sim { section, .. } => Box::new(sim::SimulatedTracking::new(
                section.fps.unwrap_or(DEFAULT_FPS),
                section.seed.unwrap_or(0),
            )),
            Self::Replay { section, .. } => Box::new(replay::ReplayTracking {
                path: section.path.clone().into(),
                fps: section.fps.unwrap_or(DEFAULT_FPS),
                looped: section.looped,
            }),
        }
    }
}

struct Loaded {
    rx: Receiver<LandmarkFrame>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Handle over the running tracking source, if any.
pub struct TrackingEngine {
    spec: Option<TrackingSpec>,
    loaded: Option<Loaded>,
}

impl TrackingEngine {
    pub fn new(spec: Option<TrackingSpec>) -> Self {
        Self { spec, loaded: None }
    }

    pub fn spec(&self) -> Option<&TrackingSpec> {
        self.spec.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Spawn the configured source. Returns `false` when no source is
    /// configured. Loading twice is a no-op.
    pub fn load(&mut self) -> bool {
        if self.loaded.is_some() {
            return true;
        }
        let Some(spec) = &self.spec else {
            tracing::warn!("tracking: no frame source configured");
            return false;
        };
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let source = spec.build();
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(format!("tracking:{}", spec.id()))
            .spawn(move || source.run(tx, thread_stop))
            .expect("failed to spawn tracking thread");
        tracing::info!("tracking: loaded '{}'", spec.id());
        self.loaded = Some(Loaded { rx, stop, handle });
        true
    }

    /// Stop the running source and wait for its thread.
    pub fn close(&mut self) -> Result<(), GameError> {
        let loaded = self.loaded.take().ok_or(GameError::TrackingEngineNotLoaded)?;
        loaded.stop.store(true, Ordering::Relaxed);
        drop(loaded.rx);
        if loaded.handle.join().is_err() {
            tracing::warn!("tracking: source thread panicked");
        }
        tracing::info!("tracking: closed");
        Ok(())
    }

    /// Every frame delivered since the last call, oldest first. A source
    /// that ended on its own (recording finished) is unloaded.
    pub fn drain(&mut self) -> Vec<LandmarkFrame> {
        let Some(loaded) = &self.loaded else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        loop {
            match loaded.rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    tracing::info!("tracking: source finished");
                    self.loaded = None;
                    break;
                }
            }
        }
        frames
    }
}

impl Drop for TrackingEngine {
    fn drop(&mut self) {
        if let Some(loaded) = &self.loaded {
            loaded.stop.store(true, Ordering::Relaxed);
        }
    }
}

/// Sleep for one frame period in short steps so `stop` is noticed quickly.
/// Returns `false` once `stop` is set.
pub(crate) fn frame_wait(period: std::time::Duration, stop: &AtomicBool) -> bool {
    let step = std::time::Duration::from_millis(10);
    let mut waited = std::time::Duration::ZERO;
    while waited < period {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let next = step.min(period - waited);
        std::thread::sleep(next);
        waited += next;
    }
    !stop.load(Ordering::Relaxed)
}
