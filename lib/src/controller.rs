//! Game controller: orchestrates one session replica.
//!
//! Owns the [`GameSession`], runs the [`CollisionDetector`] on incoming
//! frames, exposes the command API and fans domain events out to
//! listeners. Local commands are applied immediately and then handed to the
//! [`Outbox`] as broadcast messages; messages replayed from a peer go
//! through [`GameController::replay`] and are never re-broadcast.
//!
//! There is no reconciliation between replicas. Two controllers stay in step
//! only as long as they see the same command sequence.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::{
    BroadcastAction, BroadcastMessage, CHECKPOINT_CIRCLE_NUMBER, CheckpointSnapshot,
    CheckpointState, CheckpointTiming, CircleGeometry, CircleInteractionParams, ClickAction, Clock,
    CollisionDetector, DEFAULT_POINT_RADIUS, DisplaySettings, GameError, GameEvent, GameSession,
    InputState, LandmarkFrame, LastTargetRule, Origin, RepeatingTask, ScoreGeometry,
    SessionPhase, SessionSnapshot, StartCheckpoint, TargetId, TouchOutcome, Viewport,
};

/// Radius of newly created targets and the checkpoint.
pub const DEFAULT_TARGET_RADIUS: f64 = 30.0;
/// Stroke width of newly created targets and the checkpoint.
pub const DEFAULT_STROKE_WIDTH: f64 = 10.0;

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Drawing surface. Receives the full session state on every render.
pub trait Surface: Send {
    fn render(&mut self, snapshot: &SessionSnapshot);
}

/// Observer of domain events (renderers, UI, telemetry).
pub trait GameListener: Send {
    fn on_event(&mut self, event: &GameEvent, origin: Origin);
}

/// Sink for broadcast messages produced by local commands.
pub trait Outbox: Send {
    fn publish(&self, message: BroadcastMessage);
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub viewport: Viewport,
    pub point_radius: f64,
    pub checkpoint: CheckpointTiming,
    /// Score/timer refresh rate while a session runs.
    pub refresh_hz: u32,
    /// Redraw rate of the checkpoint pulse.
    pub pulse_hz: u32,
    pub last_target_rule: LastTargetRule,
    pub target_radius: f64,
    pub stroke_width: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            point_radius: DEFAULT_POINT_RADIUS,
            checkpoint: CheckpointTiming::default(),
            refresh_hz: 30,
            pulse_hz: 4,
            last_target_rule: LastTargetRule::default(),
            target_radius: DEFAULT_TARGET_RADIUS,
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

impl ControllerSettings {
    fn default_circle(&self) -> CircleGeometry {
        CircleGeometry::new(self.viewport.center(), self.target_radius).with_stroke(self.stroke_width)
    }
}

/// Result of replaying one broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Applied,
    /// Unknown action or a payload that does not match any local state.
    Ignored,
    /// A process-level action (`TRACK`, `SHOW_*`, `RESTART`) the owner of the
    /// controller has to handle.
    Unhandled(BroadcastAction),
}

// ---------------------------------------------------------------------------
// GameController
// ---------------------------------------------------------------------------

pub struct GameController {
    session: GameSession,
    detector: CollisionDetector,
    settings: ControllerSettings,
    clock: Arc<dyn Clock>,
    surface: Option<Box<dyn Surface>>,
    listeners: Vec<Box<dyn GameListener>>,
    outbox: Option<Box<dyn Outbox>>,
    display: DisplaySettings,
    refresh: RepeatingTask,
    pulse: RepeatingTask,
    dirty: bool,
}

impl GameController {
    pub fn new(settings: ControllerSettings, clock: Arc<dyn Clock>) -> Self {
        let checkpoint = StartCheckpoint::new(settings.default_circle(), settings.checkpoint);
        let score_geometry = ScoreGeometry {
            x: settings.viewport.width - 200.0,
            y: 20.0,
        };
        Self {
            session: GameSession::new(checkpoint, score_geometry),
            detector: CollisionDetector {
                point_radius: settings.point_radius,
                viewport: settings.viewport,
                last_target_rule: settings.last_target_rule,
            },
            settings,
            clock,
            surface: None,
            listeners: Vec::new(),
            outbox: None,
            display: DisplaySettings::default(),
            refresh: RepeatingTask::from_rate_hz(settings.refresh_hz),
            pulse: RepeatingTask::from_rate_hz(settings.pulse_hz),
            dirty: true,
        }
    }

    /// Attach the drawing surface. Rendering calls fail with
    /// [`GameError::LayerNotSetup`] until this is done.
    pub fn setup(&mut self, surface: Box<dyn Surface>) {
        self.surface = Some(surface);
        self.dirty = true;
    }

    /// Detach and hand back the drawing surface, consuming the controller.
    pub fn teardown(mut self) -> Option<Box<dyn Surface>> {
        self.refresh.cancel();
        self.pulse.cancel();
        self.surface.take()
    }

    pub fn add_listener(&mut self, listener: Box<dyn GameListener>) {
        self.listeners.push(listener);
    }

    pub fn set_outbox(&mut self, outbox: Box<dyn Outbox>) {
        self.outbox = Some(outbox);
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn display(&self) -> DisplaySettings {
        self.display
    }

    pub fn set_display(&mut self, display: DisplaySettings) {
        if self.display != display {
            self.display = display;
            self.dirty = true;
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.session.is_running() {
            SessionPhase::Running
        } else if self.session.started_at().is_some() {
            SessionPhase::Stopped
        } else {
            SessionPhase::NotStarted
        }
    }

    pub fn elapsed_time(&self) -> TimeDelta {
        self.session.elapsed_time(self.clock.now())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let checkpoint = &self.session.checkpoint;
        SessionSnapshot {
            phase: self.phase(),
            targets: self.session.targets().to_vec(),
            score: self.session.score().value(),
            score_geometry: self.session.score_geometry,
            checkpoint: CheckpointSnapshot {
                touched: checkpoint.touched,
                active: checkpoint.active,
                phase: checkpoint.phase(),
                pulsing: self.pulse.is_running(),
                geometry: checkpoint.geometry,
            },
            elapsed_ms: self.elapsed_time().num_milliseconds(),
            started_at: self.session.started_at(),
            stopped_at: self.session.stopped_at(),
            display: self.display,
        }
    }

    // -- commands -----------------------------------------------------------

    pub fn add_target(&mut self) -> TargetId {
        self.add_target_from(Origin::Local)
    }

    pub fn remove_target(&mut self, id: TargetId) -> Result<(), GameError> {
        self.remove_target_from(id, Origin::Local)
    }

    pub fn start(&mut self) {
        self.start_from(Origin::Local);
        self.broadcast(Origin::Local, BroadcastMessage::new(BroadcastAction::StartGame));
    }

    pub fn stop(&mut self) {
        self.stop_from(Origin::Local);
        self.broadcast(Origin::Local, BroadcastMessage::new(BroadcastAction::StopGame));
    }

    pub fn reset_game(&mut self) {
        self.reset_game_from(Origin::Local);
        self.broadcast(Origin::Local, BroadcastMessage::new(BroadcastAction::ResetGame));
    }

    pub fn reset_circles(&mut self) {
        self.reset_circles_from(Origin::Local);
        self.broadcast(Origin::Local, BroadcastMessage::new(BroadcastAction::ResetCircles));
    }

    /// Manual touch of one target.
    pub fn touch(&mut self, id: TargetId) -> Result<TouchOutcome, GameError> {
        self.touch_from(id, Origin::Local)
    }

    /// Run target collision detection for one frame. Returns the target the
    /// frame touched, if any.
    pub fn check_collisions(&mut self, frame: &LandmarkFrame) -> Option<TargetId> {
        let id = self.detector.detect(frame, &self.session)?;
        self.touch_from(id, Origin::Local).ok().map(|_| id)
    }

    /// Evaluate the start checkpoint against one frame. When it fires, the
    /// game is reset and started again.
    pub fn check_checkpoint_collision(&mut self, frame: &LandmarkFrame) -> CheckpointState {
        let now = self.clock.now();
        let hit = self.detector.checkpoint_hit(frame, &self.session);
        let before = self.session.checkpoint.state();
        let after = self.session.checkpoint.evaluate(hit, now);
        self.update_pulse(now);

        if after != before {
            self.interaction(after, Origin::Local);
        }
        if after.active {
            info!("start checkpoint activated");
            self.reset_game_from(Origin::Local);
            self.start_from(Origin::Local);
            self.session.checkpoint.rearm(now);
            self.update_pulse(now);
            // Peers saw `active` go up; let them see it come down again so
            // the next activation is a fresh rising edge.
            let rearmed = self.session.checkpoint.state();
            self.interaction(rearmed, Origin::Local);
        }
        self.session.checkpoint.state()
    }

    // -- click interactions -------------------------------------------------

    /// Click on a target: remove it with the remove modifier, otherwise grow
    /// it (or shrink it with the decrease modifier).
    pub fn click_target(&mut self, id: TargetId, input: &InputState) -> Result<(), GameError> {
        match input.target_click() {
            ClickAction::Remove => self.remove_target(id),
            ClickAction::Resize(factor) => {
                let target = self
                    .session
                    .target_mut(id)
                    .ok_or(GameError::UnknownTarget(id))?;
                target.geometry = target.geometry.resized(factor).ok_or_else(|| {
                    GameError::InvalidGeometry(format!("target {id} cannot shrink further"))
                })?;
                self.dirty = true;
                Ok(())
            }
        }
    }

    /// Click on the start checkpoint grows it by one step.
    pub fn click_checkpoint(&mut self) -> Result<(), GameError> {
        let grown = self
            .session
            .checkpoint
            .geometry
            .resized(1.0 + crate::CLICK_RESIZE_STEP)
            .ok_or_else(|| GameError::InvalidGeometry("checkpoint cannot grow".into()))?;
        self.session.checkpoint.geometry = grown;
        self.dirty = true;
        Ok(())
    }

    // -- renderer write-back ------------------------------------------------

    pub fn update_target_geometry(
        &mut self,
        id: TargetId,
        geometry: CircleGeometry,
    ) -> Result<(), GameError> {
        geometry.validate()?;
        let target = self
            .session
            .target_mut(id)
            .ok_or(GameError::UnknownTarget(id))?;
        target.geometry = geometry;
        self.dirty = true;
        Ok(())
    }

    pub fn update_score_geometry(&mut self, geometry: ScoreGeometry) -> Result<(), GameError> {
        geometry.validate()?;
        self.session.score_geometry = geometry;
        self.dirty = true;
        Ok(())
    }

    pub fn update_checkpoint_geometry(&mut self, geometry: CircleGeometry) -> Result<(), GameError> {
        geometry.validate()?;
        self.session.checkpoint.geometry = geometry;
        self.dirty = true;
        Ok(())
    }

    // -- rendering ----------------------------------------------------------

    /// Push the current state to the drawing surface.
    pub fn render(&mut self) -> Result<(), GameError> {
        let snapshot = self.snapshot();
        let surface = self.surface.as_mut().ok_or(GameError::LayerNotSetup)?;
        surface.render(&snapshot);
        self.dirty = false;
        Ok(())
    }

    /// Frame-loop hook. Renders when state changed or when the score
    /// refresh or pulse ticker is due. Returns whether a render happened.
    pub fn tick(&mut self) -> Result<bool, GameError> {
        if self.surface.is_none() {
            return Err(GameError::LayerNotSetup);
        }
        let now = self.clock.now();
        let refresh_due = self.refresh.poll(now);
        let pulse_due = self.pulse.poll(now);
        if self.dirty || refresh_due || pulse_due {
            self.render()?;
            return Ok(true);
        }
        Ok(false)
    }

    // -- replay -------------------------------------------------------------

    /// Apply a message received from a peer replica. Never broadcasts.
    pub fn replay(&mut self, message: &BroadcastMessage) -> Replay {
        match message.action {
            BroadcastAction::AddCircle => {
                self.add_target_from(Origin::Remote);
            }
            BroadcastAction::StartGame => self.start_from(Origin::Remote),
            BroadcastAction::StopGame => self.stop_from(Origin::Remote),
            BroadcastAction::ResetCircles => self.reset_circles_from(Origin::Remote),
            BroadcastAction::ResetGame => self.reset_game_from(Origin::Remote),
            BroadcastAction::CircleTouched => {
                let Some(id) = message.target_id() else {
                    debug!("CIRCLE_TOUCHED without a usable circleNumber");
                    return Replay::Ignored;
                };
                if self.touch_from(id, Origin::Remote).is_err() {
                    debug!("CIRCLE_TOUCHED for unknown circle {id}");
                    return Replay::Ignored;
                }
            }
            BroadcastAction::CircleRemoved => {
                let Some(id) = message.target_id() else {
                    return Replay::Ignored;
                };
                if self.remove_target_from(id, Origin::Remote).is_err() {
                    debug!("CIRCLE_REMOVED for unknown circle {id}");
                    return Replay::Ignored;
                }
            }
            BroadcastAction::CircleInteraction => {
                let Some(params) = message.params_as::<CircleInteractionParams>() else {
                    return Replay::Ignored;
                };
                if params.circle_number != CHECKPOINT_CIRCLE_NUMBER {
                    return Replay::Ignored;
                }
                self.remote_interaction(params.params);
            }
            BroadcastAction::Track
            | BroadcastAction::ShowCamera
            | BroadcastAction::ShowTracking
            | BroadcastAction::Restart => return Replay::Unhandled(message.action),
            BroadcastAction::Unknown => {
                debug!("ignoring unknown broadcast action");
                return Replay::Ignored;
            }
        }
        Replay::Applied
    }

    // -- internals ----------------------------------------------------------

    fn broadcast(&self, origin: Origin, message: BroadcastMessage) {
        if origin != Origin::Local {
            return;
        }
        if let Some(outbox) = &self.outbox {
            outbox.publish(message);
        }
    }

    fn emit(&mut self, event: GameEvent, origin: Origin) {
        debug!("{event} ({origin:?})");
        for listener in &mut self.listeners {
            listener.on_event(&event, origin);
        }
        self.dirty = true;
    }

    fn interaction(&mut self, state: CheckpointState, origin: Origin) {
        self.emit(GameEvent::CircleInteraction { state }, origin);
        self.broadcast(origin, BroadcastMessage::checkpoint_interaction(state));
    }

    fn add_target_from(&mut self, origin: Origin) -> TargetId {
        let geometry = self.settings.default_circle();
        let id = self.session.add_target(geometry).id;
        self.dirty = true;
        self.broadcast(origin, BroadcastMessage::new(BroadcastAction::AddCircle));
        id
    }

    fn remove_target_from(&mut self, id: TargetId, origin: Origin) -> Result<(), GameError> {
        self.session.remove_target(id)?;
        self.emit(GameEvent::CircleRemoved { id }, origin);
        self.broadcast(origin, BroadcastMessage::circle_removed(id));
        Ok(())
    }

    fn start_from(&mut self, origin: Origin) {
        let now = self.clock.now();
        self.session.start(now);
        self.refresh.start(now);
        self.update_pulse(now);
        self.emit(GameEvent::Started, origin);
    }

    /// Listeners only hear about a stop that ended a running session.
    fn stop_from(&mut self, origin: Origin) {
        let now = self.clock.now();
        let was_running = self.session.is_running();
        self.session.stop(now);
        self.refresh.cancel();
        self.update_pulse(now);
        if was_running {
            self.emit(GameEvent::Stopped, origin);
        } else {
            self.dirty = true;
        }
    }

    fn reset_game_from(&mut self, origin: Origin) {
        info!("resetting game");
        self.stop_from(origin);
        self.session.reset_game();
        self.dirty = true;
    }

    fn reset_circles_from(&mut self, _origin: Origin) {
        self.session.reset_circles();
        self.dirty = true;
    }

    fn touch_from(&mut self, id: TargetId, origin: Origin) -> Result<TouchOutcome, GameError> {
        let now = self.clock.now();
        let outcome = self.session.touch(id, now)?;
        if outcome.newly_touched {
            self.emit(GameEvent::CircleTouched { id }, origin);
            self.broadcast(origin, BroadcastMessage::circle_touched(id));
        }
        if outcome.auto_stopped {
            self.refresh.cancel();
            self.update_pulse(now);
            self.emit(GameEvent::Stopped, origin);
        }
        Ok(outcome)
    }

    fn remote_interaction(&mut self, state: CheckpointState) {
        let now = self.clock.now();
        let before = self.session.checkpoint.state();
        let rising = self.session.checkpoint.apply_remote(state, now);
        if rising {
            self.reset_game_from(Origin::Remote);
            self.start_from(Origin::Remote);
        }
        self.update_pulse(now);
        let after = self.session.checkpoint.state();
        if after != before {
            self.emit(GameEvent::CircleInteraction { state: after }, Origin::Remote);
        }
    }

    /// The pulse runs while the checkpoint is held but has not fired and no
    /// game is running.
    fn update_pulse(&mut self, now: DateTime<Utc>) {
        let checkpoint = &self.session.checkpoint;
        let wanted = checkpoint.touched && !checkpoint.active && !self.session.is_running();
        match (wanted, self.pulse.is_running()) {
            (true, false) => self.pulse.start(now),
            (false, true) => self.pulse.cancel(),
            _ => {}
        }
    }
}

impl std::fmt::Debug for GameController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameController")
            .field("phase", &self.phase())
            .field("targets", &self.session.targets().len())
            .field("surface", &self.surface.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
