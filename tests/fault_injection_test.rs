use labyrinth_control::config::VisionConfig;
use labyrinth_control::interfaces::{FrameSource, ManualClock, RecordingActuator};
use labyrinth_control::perception::{PositionEstimator, SurfaceFix};
use labyrinth_control::synthetic::{SyntheticCamera, SKEWED_QUAD};
use labyrinth_control::telemetry::{LoopCommand, RunPhase};
use labyrinth_control::{ControlLoop, LabyrinthConfig, LabyrinthError, Vector2};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(60);

type TestLoop = ControlLoop<SyntheticCamera, RecordingActuator, ManualClock>;

fn test_loop(seed: u64) -> (TestLoop, ManualClock, RecordingActuator) {
    let config = LabyrinthConfig::default();
    let camera = SyntheticCamera::new(config.vision.surface.clone(), seed).unwrap();
    let clock = ManualClock::new(Instant::now());
    let actuator = RecordingActuator::new();
    let control = ControlLoop::new(config, camera, actuator.clone(), clock.clone()).unwrap();
    (control, clock, actuator)
}

fn step(control: &mut TestLoop, clock: &ManualClock, ticks: usize) {
    for _ in 0..ticks {
        clock.advance(TICK);
        control.tick().unwrap();
    }
}

#[test]
fn brief_occlusion_keeps_phase() {
    let (mut control, clock, _) = test_loop(1);
    step(&mut control, &clock, 3);

    control.camera_mut().set_occluded(true);
    step(&mut control, &clock, 5);
    let report = control.latest().unwrap();
    assert_eq!(report.phase, RunPhase::Calibrating);
    assert!(report.reading.active);
    assert!(!report.reading.detected);
}

#[test]
fn lost_ball_freezes_actuation_until_restart() {
    let (mut control, clock, actuator) = test_loop(2);
    step(&mut control, &clock, 3);

    control.camera_mut().set_occluded(true);
    for _ in 0..20 {
        clock.advance(TICK);
        control.tick().unwrap();
        if control.phase() == RunPhase::BallLost {
            break;
        }
    }
    assert_eq!(control.phase(), RunPhase::BallLost);
    let frozen = actuator.len();

    // Reappearing does not resume on its own.
    control.camera_mut().set_occluded(false);
    step(&mut control, &clock, 5);
    assert_eq!(control.phase(), RunPhase::BallLost);
    assert_eq!(actuator.len(), frozen, "no commands while lost");
    assert_eq!(control.latest().unwrap().applied, None);

    control.handle_command(LoopCommand::Restart).unwrap();
    assert_eq!(control.phase(), RunPhase::Calibrating);
    assert_eq!(actuator.last(), Some(Vector2::ZERO), "restart levels the platform");
    assert!(!control.pid().mode().is_calibrated());
    step(&mut control, &clock, 1);
    assert!(actuator.len() > frozen + 1);
}

#[test]
fn hidden_marker_reuses_last_surface() {
    let vision = VisionConfig::default();
    let start = Instant::now();
    let mut estimator = PositionEstimator::new(&vision, start).unwrap();
    let mut camera = SyntheticCamera::new(vision.surface.clone(), 3).unwrap();
    let truth = Vector2::new(180.0, 150.0);
    camera.set_ball(Some(truth));

    let first = estimator.update(start, &camera.next_frame().unwrap());
    assert_eq!(first.surface, SurfaceFix::Fresh);

    camera.set_marker_visible(false);
    for misses in 1..=3 {
        let reading = estimator.update(start, &camera.next_frame().unwrap());
        assert_eq!(reading.surface, SurfaceFix::Stale { consecutive_misses: misses });
        assert!(reading.detected, "ball is still found through the cached surface");
        assert!(reading.position.distance(truth) < 1.5);
    }

    camera.set_marker_visible(true);
    let recovered = estimator.update(start, &camera.next_frame().unwrap());
    assert_eq!(recovered.surface, SurfaceFix::Fresh);
}

#[test]
fn never_seen_marker_expires_ball() {
    let vision = VisionConfig::default();
    let start = Instant::now();
    let mut estimator = PositionEstimator::new(&vision, start).unwrap();
    let mut camera = SyntheticCamera::new(vision.surface.clone(), 4).unwrap();
    camera.set_marker_visible(false);

    let early = estimator.update(start + Duration::from_millis(200), &camera.next_frame().unwrap());
    assert_eq!(early.surface, SurfaceFix::Missing);
    assert!(early.active && !early.detected);

    let late = estimator.update(start + Duration::from_millis(700), &camera.next_frame().unwrap());
    assert!(!late.active);
}

#[test]
fn camera_failure_surfaces_as_error() {
    let (mut control, clock, _) = test_loop(5);
    step(&mut control, &clock, 2);

    control.camera_mut().fail_next_frame();
    clock.advance(TICK);
    assert!(matches!(control.tick(), Err(LabyrinthError::FrameSource(_))));

    clock.advance(TICK);
    assert!(control.tick().unwrap().is_some(), "loop keeps working after a failed frame");
}

#[test]
fn invalid_configs_are_rejected() {
    let mut config = LabyrinthConfig::default();
    config.pid.buffer_size = 1;
    let camera = SyntheticCamera::new(config.vision.surface.clone(), 6).unwrap();
    let result = ControlLoop::new(config, camera, RecordingActuator::new(), ManualClock::default());
    assert!(matches!(result, Err(LabyrinthError::InvalidConfig(_))));

    let mut config = LabyrinthConfig::default();
    config.maze.builtin = "unknown".into();
    assert!(matches!(config.validate(), Err(LabyrinthError::UnknownMaze(_))));
}

#[test]
fn pause_freezes_and_resume_clears_integral() {
    let (mut control, clock, actuator) = test_loop(7);
    step(&mut control, &clock, 5);
    assert_ne!(control.pid().integral_accumulator(), Vector2::ZERO);

    control.pause();
    assert_eq!(control.phase(), RunPhase::Paused);
    let frozen = actuator.len();
    step(&mut control, &clock, 5);
    assert_eq!(actuator.len(), frozen);

    control.resume();
    assert_eq!(control.phase(), RunPhase::Calibrating);
    assert_eq!(control.pid().integral_accumulator(), Vector2::ZERO);
}

#[test]
fn pause_is_ignored_once_ball_is_lost() {
    let (mut control, clock, _) = test_loop(8);
    control.camera_mut().set_ball(None);
    step(&mut control, &clock, 12);
    assert_eq!(control.phase(), RunPhase::BallLost);

    control.pause();
    assert_eq!(control.phase(), RunPhase::BallLost);
    control.resume();
    assert_eq!(control.phase(), RunPhase::BallLost);
}

#[test]
fn bumped_camera_is_redetected() {
    let vision = VisionConfig::default();
    let start = Instant::now();
    let mut estimator = PositionEstimator::new(&vision, start).unwrap();
    let mut camera = SyntheticCamera::new(vision.surface.clone(), 10).unwrap();
    let truth = Vector2::new(120.0, 200.0);
    camera.set_ball(Some(truth));
    assert!(estimator.update(start, &camera.next_frame().unwrap()).surface.is_fresh());

    camera.set_quad(SKEWED_QUAD).unwrap();
    let reading = estimator.update(start, &camera.next_frame().unwrap());
    assert!(reading.surface.is_fresh(), "new geometry is detected on the next frame");
    assert!(reading.position.distance(truth) < 2.0);
}
