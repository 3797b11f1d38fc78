//! Integration tests for planning and dispatching a recorded trajectory
//!
//! These tests validate the replay path without a vehicle:
//! - Degenerate steps are held, not commanded
//! - A refused command aborts the remaining steps
//! - Relative commands reproduce the recorded path

mod common;

use common::builders::TrajectoryBuilder;
use kinreplay::replay::{
    CommandDispatcher, DispatchOptions, RecordingPacer, ReplayMode, ReplayPlanner, MIN_HOLD,
};
use kinreplay::{CommandError, MotionControl, ReplayError, Vec3};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    MoveBy(Vec3, f64),
    GoTo(Vec3, f64),
    TakeOff(f64),
    Land,
}

/// Records every call; optionally refuses the n-th motion command
#[derive(Default)]
struct CommandLog {
    calls: Vec<Call>,
    refuse: Option<usize>,
    motions: usize,
}

impl CommandLog {
    fn refusing(n: usize) -> Self {
        Self {
            refuse: Some(n),
            ..Default::default()
        }
    }

    fn motion(&mut self, call: Call) -> Result<(), CommandError> {
        self.motions += 1;
        if self.refuse == Some(self.motions) {
            return Err(CommandError::Rejected("refused by test".to_string()));
        }
        self.calls.push(call);
        Ok(())
    }

    fn moves(&self) -> Vec<Vec3> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::MoveBy(d, _) => Some(*d),
                _ => None,
            })
            .collect()
    }
}

impl MotionControl for CommandLog {
    fn move_by(&mut self, dx: f64, dy: f64, dz: f64, speed: f64) -> Result<(), CommandError> {
        self.motion(Call::MoveBy(Vec3::new(dx, dy, dz), speed))
    }

    fn go_to(&mut self, x: f64, y: f64, z: f64, speed: f64) -> Result<(), CommandError> {
        self.motion(Call::GoTo(Vec3::new(x, y, z), speed))
    }

    fn take_off(&mut self, height: f64) -> Result<(), CommandError> {
        self.calls.push(Call::TakeOff(height));
        Ok(())
    }

    fn land(&mut self) -> Result<(), CommandError> {
        self.calls.push(Call::Land);
        Ok(())
    }
}

#[test]
fn test_repeated_timestamp_yields_one_move_and_one_pause() {
    let recorded = TrajectoryBuilder::new()
        .point(0, 0.0, 0.0, 0.0)
        .point(100, 1.0, 0.0, 0.0)
        .point(100, 1.0, 0.0, 0.0)
        .build();

    let steps: Vec<_> = ReplayPlanner::new().plan(recorded.as_slice()).collect();
    assert_eq!(steps.len(), 2);
    common::assert_float_eq(steps[0].speed, 10.0, 1e-9);
    assert_eq!(steps[0].hold, Duration::from_millis(100));
    assert_eq!(steps[1].speed, 0.0);
    assert_eq!(steps[1].hold, MIN_HOLD);

    let mut vehicle = CommandLog::default();
    let pacer = RecordingPacer::new();
    let mut dispatcher = CommandDispatcher::new(DispatchOptions::default(), pacer.clone());
    let report = dispatcher.dispatch(&mut vehicle, steps, None).unwrap();

    assert_eq!(vehicle.calls.len(), 1);
    assert_eq!(vehicle.calls[0], Call::MoveBy(Vec3::new(1.0, 0.0, 0.0), 10.0));
    assert_eq!(report.moves, 1);
    assert_eq!(report.skips, 1);
    assert_eq!(pacer.holds(), vec![Duration::from_millis(100), MIN_HOLD]);
}

#[test]
fn test_failure_on_step_two_stops_dispatch() {
    let recorded = TrajectoryBuilder::new().straight_line(6, 100, 0.5).build();
    let mut vehicle = CommandLog::refusing(2);
    let mut dispatcher = CommandDispatcher::new(DispatchOptions::default(), RecordingPacer::new());

    let steps = ReplayPlanner::new().plan(recorded.as_slice());
    let result = dispatcher.dispatch(&mut vehicle, steps, None);
    match result {
        Err(ReplayError::Dispatch { step, source }) => {
            assert_eq!(step, 2);
            assert!(matches!(source, CommandError::Rejected(_)));
        }
        other => panic!("expected a dispatch failure, got {:?}", other),
    }
    // Step 1 went out, step 2 was refused, 3-5 were never attempted
    assert_eq!(vehicle.calls.len(), 1);
    assert_eq!(vehicle.motions, 2);
}

#[test]
fn test_relative_moves_sum_to_recorded_displacement() {
    let recorded = TrajectoryBuilder::new()
        .point(0, 0.0, 0.0, 0.5)
        .point(100, 0.1, 0.05, 0.5)
        .point(250, 0.3, 0.05, 0.6)
        .point(300, 0.3, 0.05, 0.6)
        .point(420, 0.2, -0.1, 0.4)
        .build();

    let mut vehicle = CommandLog::default();
    let mut dispatcher = CommandDispatcher::new(DispatchOptions::default(), RecordingPacer::new());
    dispatcher
        .dispatch(&mut vehicle, ReplayPlanner::new().plan(recorded.as_slice()), None)
        .unwrap();

    let total = vehicle.moves().into_iter().fold(Vec3::ZERO, |acc, d| acc + d);
    let expected = recorded.last().unwrap().position() - recorded.first().unwrap().position();
    assert!(total.approx_eq(&expected, 1e-9), "{} vs {}", total, expected);
}

#[test]
fn test_waypoint_mode_with_managed_flight() {
    let recorded = TrajectoryBuilder::new().straight_line(3, 100, 1.0).build();
    let options = DispatchOptions {
        mode: ReplayMode::Waypoint,
        manage_flight: true,
        takeoff_height_m: 0.4,
        stop_on_signal: false,
    };
    let mut vehicle = CommandLog::default();
    let mut dispatcher = CommandDispatcher::new(options, RecordingPacer::new());
    dispatcher
        .dispatch(&mut vehicle, ReplayPlanner::new().plan(recorded.as_slice()), None)
        .unwrap();

    assert_eq!(vehicle.calls.first(), Some(&Call::TakeOff(0.4)));
    assert_eq!(vehicle.calls.last(), Some(&Call::Land));
    assert_eq!(
        vehicle.calls[1..3]
            .iter()
            .map(|c| match c {
                Call::GoTo(p, _) => p.x,
                _ => f64::NAN,
            })
            .collect::<Vec<_>>(),
        vec![0.1, 0.2]
    );
}

#[test]
fn test_speed_clamp_is_reported() {
    let recorded = TrajectoryBuilder::new().straight_line(4, 100, 3.0).build();
    let planner = ReplayPlanner::new().with_max_speed(Some(1.0));
    let mut vehicle = CommandLog::default();
    let mut dispatcher = CommandDispatcher::new(DispatchOptions::default(), RecordingPacer::new());
    let report = dispatcher
        .dispatch(&mut vehicle, planner.plan(recorded.as_slice()), None)
        .unwrap();

    assert_eq!(report.clamped, 3);
    for call in &vehicle.calls {
        if let Call::MoveBy(_, speed) = call {
            assert!(*speed <= 1.0);
        }
    }
}
