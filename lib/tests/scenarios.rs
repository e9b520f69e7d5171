//! End-to-end game scenarios driven through the public controller API.

use std::sync::{Arc, Mutex};

use climbar::{
    BroadcastAction, BroadcastMessage, CheckpointState, ControllerSettings, GameController,
    GameEvent, GameListener, Landmark, LandmarkFrame, ManualClock, Origin, Outbox, Point, Replay,
    SessionPhase, TargetId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Outbox that queues messages for manual delivery to another replica.
#[derive(Clone, Default)]
struct Channel {
    queue: Arc<Mutex<Vec<BroadcastMessage>>>,
}

impl Outbox for Channel {
    fn publish(&self, message: BroadcastMessage) {
        self.queue.lock().unwrap().push(message);
    }
}

impl Channel {
    fn drain(&self) -> Vec<BroadcastMessage> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    /// Deliver everything queued so far to `to`, through JSON like the wire.
    fn deliver(&self, to: &mut GameController) -> usize {
        let pending = self.drain();
        for message in &pending {
            let text = serde_json::to_string(message).unwrap();
            let decoded: BroadcastMessage = serde_json::from_str(&text).unwrap();
            to.replay(&decoded);
        }
        pending.len()
    }
}

#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<(GameEvent, Origin)>>>);

impl GameListener for Events {
    fn on_event(&mut self, event: &GameEvent, origin: Origin) {
        self.0.lock().unwrap().push((event.clone(), origin));
    }
}

fn settings() -> ControllerSettings {
    ControllerSettings::default()
}

fn replica(clock: &ManualClock) -> (GameController, Channel, Events) {
    let mut ctl = GameController::new(settings(), Arc::new(clock.clone()));
    let channel = Channel::default();
    let events = Events::default();
    ctl.set_outbox(Box::new(channel.clone()));
    ctl.add_listener(Box::new(events.clone()));
    (ctl, channel, events)
}

/// Frame with a single pose landmark at pixel position `p`.
fn touch_frame(p: Point) -> LandmarkFrame {
    let vp = settings().viewport;
    LandmarkFrame {
        pose_landmarks: vec![Landmark::new(p.x / vp.width, p.y / vp.height)],
        ..Default::default()
    }
}

/// Three targets spread across the viewport, session started.
fn three_target_game(clock: &ManualClock) -> (GameController, Channel, Events) {
    let (mut ctl, channel, events) = replica(clock);
    for (id, x) in [(1, 200.0), (2, 600.0), (3, 1000.0)] {
        let added = ctl.add_target();
        assert_eq!(added, id);
        let mut geometry = ctl.session().target(id).unwrap().geometry;
        geometry.x = x;
        geometry.y = 300.0;
        ctl.update_target_geometry(id, geometry).unwrap();
    }
    ctl.start();
    (ctl, channel, events)
}

fn touched_ids(ctl: &GameController) -> Vec<TargetId> {
    ctl.session()
        .targets()
        .iter()
        .filter(|t| t.touched)
        .map(|t| t.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn touching_one_of_three_keeps_running() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, _) = three_target_game(&clock);

    // Inside target #2's radius but not at its centre.
    let hit = ctl.check_collisions(&touch_frame(Point::new(620.0, 310.0)));
    assert_eq!(hit, Some(2));
    assert_eq!(touched_ids(&ctl), vec![2]);
    assert_eq!(ctl.session().score().value(), 1);
    assert_eq!(ctl.phase(), SessionPhase::Running);
}

#[test]
fn touching_the_rest_auto_stops() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, events) = three_target_game(&clock);
    ctl.check_collisions(&touch_frame(Point::new(600.0, 300.0)));

    clock.advance_ms(400);
    assert_eq!(ctl.check_collisions(&touch_frame(Point::new(200.0, 300.0))), Some(1));
    assert_eq!(ctl.phase(), SessionPhase::Running);

    clock.advance_ms(600);
    assert_eq!(ctl.check_collisions(&touch_frame(Point::new(1000.0, 300.0))), Some(3));
    assert_eq!(ctl.phase(), SessionPhase::Stopped);
    assert_eq!(ctl.session().score().value(), 3);

    let stops = events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|(e, _)| *e == GameEvent::Stopped)
        .count();
    assert_eq!(stops, 1);

    // Elapsed time froze at the final touch.
    clock.advance_ms(10_000);
    assert_eq!(ctl.elapsed_time().num_milliseconds(), 1000);
}

#[test]
fn one_touch_per_frame() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, _) = three_target_game(&clock);
    let everywhere = LandmarkFrame {
        pose_landmarks: [200.0, 600.0, 1000.0]
            .iter()
            .map(|x| Landmark::new(x / 1280.0, 300.0 / 720.0))
            .collect(),
        ..Default::default()
    };
    assert_eq!(ctl.check_collisions(&everywhere), Some(1));
    assert_eq!(touched_ids(&ctl), vec![1]);
    assert_eq!(ctl.check_collisions(&everywhere), Some(2));
    assert_eq!(ctl.check_collisions(&everywhere), Some(3));
    assert_eq!(ctl.check_collisions(&everywhere), None);
}

#[test]
fn frames_are_ignored_before_start() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, _) = replica(&clock);
    let id = ctl.add_target();
    let centre = ctl.session().target(id).unwrap().geometry.center();
    assert_eq!(ctl.check_collisions(&touch_frame(centre)), None);
    assert!(touched_ids(&ctl).is_empty());
}

#[test]
fn replica_applies_add_circle_without_rebroadcast() {
    let clock = ManualClock::epoch();
    let (mut a, a_out, _) = replica(&clock);
    let (mut b, b_out, b_events) = replica(&clock);

    assert_eq!(a.add_target(), 1);
    assert_eq!(a_out.deliver(&mut b), 1);

    assert_eq!(b.session().targets().len(), 1);
    assert_eq!(b.session().targets()[0].id, 1);
    // Nothing to send back: no loop.
    assert_eq!(b_out.deliver(&mut a), 0);
    assert_eq!(a.session().targets().len(), 1);
    assert!(b_events.0.lock().unwrap().iter().all(|(_, o)| *o == Origin::Remote));
}

#[test]
fn replicas_follow_the_same_command_stream() {
    let clock = ManualClock::epoch();
    let (mut stage, stage_out, _) = replica(&clock);
    let (mut control, control_out, _) = replica(&clock);

    // The control surface drives the menu.
    control.add_target();
    control.add_target();
    control.start();
    control_out.deliver(&mut stage);
    assert_eq!(stage.phase(), SessionPhase::Running);
    assert_eq!(stage.session().targets().len(), 2);

    // The stage sees the player touch target 1 and reports it back.
    let centre = stage.session().target(1).unwrap().geometry.center();
    clock.advance_ms(250);
    stage.check_collisions(&touch_frame(centre));
    assert_eq!(stage_out.deliver(&mut control), 1);
    assert_eq!(touched_ids(&control), vec![1]);
    assert_eq!(control.session().score().value(), 1);

    // Control removes target 2; stage follows. The touched target alone
    // does not end the game on either side.
    control.remove_target(2).unwrap();
    control_out.deliver(&mut stage);
    assert_eq!(stage.session().targets().len(), 1);
    assert_eq!(stage.phase(), SessionPhase::Running);

    control.stop();
    control_out.deliver(&mut stage);
    assert_eq!(stage.phase(), SessionPhase::Stopped);
    assert_eq!(stage.session().score().value(), control.session().score().value());
}

#[test]
fn auto_stop_happens_independently_on_each_replica() {
    let clock = ManualClock::epoch();
    let (mut stage, stage_out, _) = replica(&clock);
    let (mut control, control_out, _) = replica(&clock);
    stage.add_target();
    stage.start();
    stage_out.deliver(&mut control);

    let centre = stage.session().target(1).unwrap().geometry.center();
    stage.check_collisions(&touch_frame(centre));
    assert_eq!(stage.phase(), SessionPhase::Stopped);

    // Only CIRCLE_TOUCHED crosses; the control replica stops on its own.
    let sent = stage_out.drain();
    assert_eq!(
        sent.iter().map(|m| m.action).collect::<Vec<_>>(),
        vec![BroadcastAction::CircleTouched]
    );
    for message in &sent {
        control.replay(message);
    }
    assert_eq!(control.phase(), SessionPhase::Stopped);
    assert!(control_out.drain().is_empty());
}

#[test]
fn checkpoint_held_until_two_seconds_activates() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, _) = replica(&clock);
    let centre = ctl.session().checkpoint.geometry.center();
    let frame = touch_frame(centre);

    let mut t = 0;
    while t < 2000 {
        let state = ctl.check_checkpoint_collision(&frame);
        assert!(!state.active, "activated early at {t}ms");
        assert_eq!(ctl.phase(), SessionPhase::NotStarted);
        clock.advance_ms(30);
        t += 30;
    }
    // 2010ms since the first touch.
    ctl.check_checkpoint_collision(&frame);
    assert_eq!(ctl.phase(), SessionPhase::Running);

    clock.advance_ms(90);
    ctl.check_checkpoint_collision(&frame);
    assert_eq!(ctl.phase(), SessionPhase::Running);
}

#[test]
fn checkpoint_activation_reaches_the_other_replica() {
    let clock = ManualClock::epoch();
    let (mut stage, stage_out, _) = replica(&clock);
    let (mut control, _, control_events) = replica(&clock);
    let frame = touch_frame(stage.session().checkpoint.geometry.center());

    stage.check_checkpoint_collision(&frame);
    clock.advance_ms(2000);
    stage.check_checkpoint_collision(&frame);
    assert_eq!(stage.phase(), SessionPhase::Running);

    stage_out.deliver(&mut control);
    assert_eq!(control.phase(), SessionPhase::Running);
    let interactions: Vec<CheckpointState> = control_events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(e, _)| match e {
            GameEvent::CircleInteraction { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        interactions.last(),
        Some(&CheckpointState {
            touched: true,
            active: false
        })
    );
}

#[test]
fn unknown_actions_are_dropped() {
    let clock = ManualClock::epoch();
    let (mut ctl, out, events) = replica(&clock);
    let message: BroadcastMessage =
        serde_json::from_str(r#"{"action":"SPIN_WHEEL","params":{"speed":3}}"#).unwrap();
    assert_eq!(ctl.replay(&message), Replay::Ignored);
    assert!(events.0.lock().unwrap().is_empty());
    assert!(out.drain().is_empty());
}

#[test]
fn ids_stay_sequential_across_removals() {
    let clock = ManualClock::epoch();
    let (mut ctl, _, _) = replica(&clock);
    let ids: Vec<TargetId> = (0..3).map(|_| ctl.add_target()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    ctl.remove_target(1).unwrap();
    let more: Vec<TargetId> = (0..2).map(|_| ctl.add_target()).collect();
    assert_eq!(more, vec![4, 5]);
    let remaining: Vec<TargetId> = ctl.session().targets().iter().map(|t| t.id).collect();
    assert_eq!(remaining, vec![2, 3, 4, 5]);

    // A late touch for a target cleared by RESET_CIRCLES finds nothing.
    ctl.reset_circles();
    assert_eq!(ctl.add_target(), 6);
    assert_eq!(ctl.replay(&BroadcastMessage::circle_touched(1)), Replay::Ignored);
    assert!(ctl.session().targets().iter().all(|t| !t.touched));
}
