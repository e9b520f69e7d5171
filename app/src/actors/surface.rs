//! Surface actor: owns this process's game replica.
//!
//! Always runs, and starts before the config-driven actors so no command is
//! missed. Holds the single `GameController` and the `SessionStateWriter`;
//! every other actor sees the game only through bus events and snapshots.
//!
//! Loop: drain the bus (local commands, inbound wire messages), drain
//! tracking frames (checkpoint first, then targets), let the controller
//! render if something changed or a refresh is due, sleep briefly.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use climbar::{
    ActorState, ActorStatus, AlertLevel, AlertMessage, BroadcastAction, BroadcastMessage,
    ClimbarConfig, ClimbarEvent, ClimbarMessage, GameCommand, GameController, GameError,
    GameEvent, GameListener, Origin, Outbox, Replay, SessionSnapshot, Surface, SurfaceRole,
    SystemClock,
};

use super::Actor;
use super::tracking::{TrackingEngine, TrackingSpec};
use crate::bus::{BusReceiver, BusSender, PollError};
use crate::state::{SessionStateWriter, SystemState};

/// Bus source id of the surface actor.
pub const SURFACE_ID: &str = "surface";

const LOOP_SLEEP: Duration = Duration::from_millis(10);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Controller collaborators
// ---------------------------------------------------------------------------

/// Drawing surface of a headless process: every render becomes the
/// published session snapshot.
struct SnapshotSurface {
    writer: SessionStateWriter,
    sender: BusSender,
}

impl Surface for SnapshotSurface {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        self.writer.publish(snapshot.clone());
        self.sender.send(ClimbarMessage::new(snapshot.clone()));
    }
}

struct EventLog;

impl GameListener for EventLog {
    fn on_event(&mut self, event: &GameEvent, origin: Origin) {
        match origin {
            Origin::Local => tracing::info!("game: {event}"),
            Origin::Remote => tracing::info!("game: {event} (from peer)"),
        }
    }
}

/// Frames per second over one-second windows.
struct FpsMeter {
    window_start: Instant,
    count: u32,
    value: u32,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
            value: 0,
        }
    }

    fn tick(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.value = self.count;
            self.count = 1;
            self.window_start = now;
        } else {
            self.count += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub struct SurfaceActor {
    writer: Mutex<Option<SessionStateWriter>>,
    ready_tx: Mutex<Option<std_mpsc::SyncSender<()>>>,
}

impl SurfaceActor {
    pub fn new(writer: SessionStateWriter) -> (Self, std_mpsc::Receiver<()>) {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(0);
        let actor = Self {
            writer: Mutex::new(Some(writer)),
            ready_tx: Mutex::new(Some(ready_tx)),
        };
        (actor, ready_rx)
    }
}

impl Actor for SurfaceActor {
    fn start(&self, state: Arc<SystemState>, sender: BusSender, receiver: BusReceiver) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .expect("SurfaceActor::start() called more than once");
        let ready_tx = self
            .ready_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .expect("SurfaceActor::start() called more than once");

        std::thread::Builder::new()
            .name(SURFACE_ID.into())
            .spawn(move || run(state, writer, sender, receiver, ready_tx))
            .expect("failed to spawn surface thread");
    }
}

fn run(
    state: Arc<SystemState>,
    writer: SessionStateWriter,
    sender: BusSender,
    mut receiver: BusReceiver,
    ready_tx: std_mpsc::SyncSender<()>,
) {
    let surface = Box::new(SnapshotSurface {
        writer,
        sender: sender.clone(),
    });
    let mut runtime = Runtime::new(state, sender.clone(), surface);

    // Signal main thread that we're up and polling.
    let _ = ready_tx.send(());
    drop(ready_tx);

    runtime.autostart_tracking();
    sender.send(ClimbarMessage::new(ActorState::new(
        ActorStatus::Connected,
        runtime.telemetry(),
    )));
    let mut last_status = Instant::now();

    loop {
        loop {
            match receiver.poll() {
                Err(PollError::Shutdown) => {
                    tracing::info!("surface: shutting down");
                    runtime.shutdown();
                    return;
                }
                Ok(None) => break,
                Ok(Some(msg)) => runtime.handle(&msg),
            }
        }

        runtime.process_frames();
        runtime.tick();

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            sender.send(ClimbarMessage::new(ActorState::new(
                ActorStatus::Connected,
                runtime.telemetry(),
            )));
        }

        std::thread::sleep(LOOP_SLEEP);
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Everything the surface thread owns.
struct Runtime {
    state: Arc<SystemState>,
    sender: BusSender,
    role: SurfaceRole,
    controller: GameController,
    tracking: TrackingEngine,
    fps: FpsMeter,
}

fn build_controller(config: &ClimbarConfig, sender: &BusSender) -> GameController {
    let mut controller = GameController::new(config.controller_settings(), Arc::new(SystemClock));
    controller.set_outbox(Box::new(sender.clone()));
    controller.add_listener(Box::new(EventLog));
    controller
}

impl Runtime {
    fn new(state: Arc<SystemState>, sender: BusSender, surface: Box<dyn Surface>) -> Self {
        let config = state.system.snapshot();
        let role = config.surface.role;
        let mut controller = build_controller(&config, &sender);
        controller.setup(surface);
        let spec = match role {
            SurfaceRole::Stage => TrackingSpec::from_config(&config),
            SurfaceRole::Control => None,
        };
        tracing::info!("surface: {role} replica ready");
        Self {
            state,
            sender,
            role,
            controller,
            tracking: TrackingEngine::new(spec),
            fps: FpsMeter::new(),
        }
    }

    /// A stage with a configured frame source starts tracking right away
    /// and tells linked replicas so their toggle agrees.
    fn autostart_tracking(&mut self) {
        if self.role == SurfaceRole::Stage && self.tracking.spec().is_some() {
            let enabled = self.set_toggle(BroadcastAction::Track, Some(true));
            self.sender
                .publish(BroadcastMessage::display_toggle(BroadcastAction::Track, enabled));
        }
    }

    fn handle(&mut self, msg: &ClimbarMessage) {
        match &msg.event {
            ClimbarEvent::Command(cmd) => {
                if let Err(e) = self.execute(cmd) {
                    tracing::warn!("surface: command {cmd:?} from '{}' failed: {e}", msg.source);
                    self.sender.send(ClimbarMessage::new(AlertMessage {
                        level: AlertLevel::Warn,
                        message: format!("command failed: {e}"),
                    }));
                }
            }
            ClimbarEvent::Inbound(wire) => self.replay(wire),
            _ => {}
        }
    }

    fn execute(&mut self, cmd: &GameCommand) -> Result<(), GameError> {
        match cmd {
            GameCommand::AddTarget => {
                self.controller.add_target();
            }
            GameCommand::RemoveTarget { id } => self.controller.remove_target(*id)?,
            GameCommand::Start => self.controller.start(),
            GameCommand::Stop => self.controller.stop(),
            GameCommand::ResetGame => self.controller.reset_game(),
            GameCommand::ResetCircles => self.controller.reset_circles(),
            GameCommand::Touch { id } => {
                self.controller.touch(*id)?;
            }
            GameCommand::ClickTarget { id, input } => self.controller.click_target(*id, input)?,
            GameCommand::ClickCheckpoint => self.controller.click_checkpoint()?,
            GameCommand::UpdateTargetGeometry { id, geometry } => {
                self.controller.update_target_geometry(*id, *geometry)?
            }
            GameCommand::UpdateScoreGeometry { geometry } => {
                self.controller.update_score_geometry(*geometry)?
            }
            GameCommand::UpdateCheckpointGeometry { geometry } => {
                self.controller.update_checkpoint_geometry(*geometry)?
            }
            GameCommand::ToggleTracking => self.toggle_and_broadcast(BroadcastAction::Track),
            GameCommand::ToggleCamera => self.toggle_and_broadcast(BroadcastAction::ShowCamera),
            GameCommand::ToggleLandmarks => {
                self.toggle_and_broadcast(BroadcastAction::ShowTracking)
            }
            GameCommand::ToggleCollisions => {
                let mut settings = self.controller.display();
                settings.detect_collisions = !settings.detect_collisions;
                let state = on_off(settings.detect_collisions);
                tracing::info!("surface: collision detection {state}");
                self.controller.set_display(settings);
            }
            GameCommand::Restart => {
                self.sender.publish(BroadcastMessage::new(BroadcastAction::Restart));
                self.restart();
            }
        }
        Ok(())
    }

    fn replay(&mut self, wire: &BroadcastMessage) {
        match self.controller.replay(wire) {
            Replay::Applied | Replay::Ignored => {}
            Replay::Unhandled(BroadcastAction::Restart) => self.restart(),
            Replay::Unhandled(action) => {
                self.set_toggle(action, wire.toggle_state());
            }
        }
    }

    /// Flip a toggle locally and send the resulting value, so every
    /// replica ends up with the same setting whatever it held before.
    fn toggle_and_broadcast(&mut self, action: BroadcastAction) {
        let enabled = self.set_toggle(action, None);
        self.sender
            .publish(BroadcastMessage::display_toggle(action, enabled));
    }

    /// Set one display toggle to `wanted`, or flip it when `None`. `TRACK`
    /// also loads or closes the frame source on a stage. Returns the value
    /// the toggle ends up with.
    fn set_toggle(&mut self, action: BroadcastAction, wanted: Option<bool>) -> bool {
        let mut settings = self.controller.display();
        let enabled = match action {
            BroadcastAction::ShowCamera => {
                settings.show_camera = wanted.unwrap_or(!settings.show_camera);
                settings.show_camera
            }
            BroadcastAction::ShowTracking => {
                settings.show_landmarks = wanted.unwrap_or(!settings.show_landmarks);
                settings.show_landmarks
            }
            BroadcastAction::Track => {
                let mut enabled = wanted.unwrap_or(!settings.tracking_enabled);
                if self.role == SurfaceRole::Stage {
                    if enabled && !self.tracking.is_loaded() {
                        if !self.tracking.load() {
                            enabled = false;
                            self.sender.send(ClimbarMessage::new(AlertMessage {
                                level: AlertLevel::Warn,
                                message: "no tracking source configured".into(),
                            }));
                        }
                    } else if !enabled
                        && self.tracking.is_loaded()
                        && let Err(e) = self.tracking.close()
                    {
                        tracing::warn!("surface: {e}");
                    }
                }
                settings.tracking_enabled = enabled;
                let state = on_off(enabled);
                tracing::info!("surface: tracking {state}");
                enabled
            }
            other => {
                tracing::debug!("surface: {other} is not a display toggle");
                return false;
            }
        };
        self.controller.set_display(settings);
        enabled
    }

    /// Throw the replica away and start from a fresh one, keeping the
    /// drawing surface.
    fn restart(&mut self) {
        tracing::info!("surface: restarting replica");
        if self.tracking.is_loaded() {
            let _ = self.tracking.close();
        }
        let config = self.state.system.snapshot();
        let fresh = build_controller(&config, &self.sender);
        let old = std::mem::replace(&mut self.controller, fresh);
        match old.teardown() {
            Some(surface) => self.controller.setup(surface),
            None => tracing::warn!("surface: previous replica had no drawing surface"),
        }
        self.autostart_tracking();
    }

    /// Feed every pending frame through the controller. Returns the number
    /// of frames processed.
    fn process_frames(&mut self) -> usize {
        let frames = self.tracking.drain();
        if self.role == SurfaceRole::Stage
            && self.controller.display().tracking_enabled
            && !self.tracking.is_loaded()
        {
            // Source ended on its own.
            let mut settings = self.controller.display();
            settings.tracking_enabled = false;
            self.controller.set_display(settings);
        }
        let detect = self.controller.display().detect_collisions;
        for frame in &frames {
            self.fps.tick(Instant::now());
            self.controller.check_checkpoint_collision(frame);
            if detect {
                self.controller.check_collisions(frame);
            }
        }
        frames.len()
    }

    fn tick(&mut self) {
        if let Err(e) = self.controller.tick() {
            tracing::warn!("surface: render failed: {e}");
        }
    }

    fn telemetry(&self) -> HashMap<String, String> {
        let session = self.controller.session();
        let mut telemetry = HashMap::new();
        telemetry.insert("role".into(), self.role.to_string());
        telemetry.insert("phase".into(), self.controller.phase().to_string());
        telemetry.insert("targets".into(), session.targets().len().to_string());
        telemetry.insert("score".into(), session.score().value().to_string());
        telemetry.insert("fps".into(), self.fps.value.to_string());
        let tracking = match (self.tracking.is_loaded(), self.tracking.spec()) {
            (true, Some(spec)) => spec.id().to_string(),
            _ => "off".to_string(),
        };
        telemetry.insert("tracking".into(), tracking);
        telemetry
    }

    fn shutdown(&mut self) {
        if self.tracking.is_loaded() {
            let _ = self.tracking.close();
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
