use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use labyrinth_control::analysis::render_timing_chart;
use labyrinth_control::interfaces::{MazeSource, MonotonicClock, RecordingActuator};
use labyrinth_control::synthetic::{route_path, SyntheticCamera, SKEWED_QUAD};
use labyrinth_control::telemetry::TelemetryChannels;
use labyrinth_control::{load_config, spawn_control_thread, ControlLoop, Result, Vector2};
use tracing::error;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("===========================================");
    println!("Starting Labyrinth Control Demo");
    println!("===========================================\n");

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/labyrinth.toml".to_string());
    let config = load_config(&path)?;
    let maze = config.maze()?;

    // Script the ball: rest for calibration, then visit every checkpoint.
    let hz = config.timing.control_frequency_hz;
    let frames = |secs: f64| (secs * hz).ceil() as usize;
    let first = maze.checkpoints.first().map(|c| c.position).unwrap_or_default();
    let start = first + Vector2::new(15.0, 0.0);
    let script = route_path(
        start,
        &maze,
        frames(config.calibration.window_s + 1.0),
        frames(1.0),
        frames(config.checkpoints.dwell_s + 0.5),
    );
    let run_time = Duration::from_secs_f64(script.len() as f64 / hz + 2.0);

    let mut camera = SyntheticCamera::with_quad(config.vision.surface.clone(), SKEWED_QUAD, 42)?;
    camera.follow_path(script);
    let actuator = RecordingActuator::new();
    let channels = TelemetryChannels::new(config.telemetry.channel_capacity);

    let control = ControlLoop::new(config, camera, actuator.clone(), MonotonicClock)?
        .with_telemetry(channels.clone());
    let metrics = control.metrics();
    let performance_log = control.performance_log();

    let (handle, stats) = spawn_control_thread(control);
    println!("Running maze '{}' for {:.1} seconds...\n", maze.name, run_time.as_secs_f64());

    let begin = Instant::now();
    while begin.elapsed() < run_time && !handle.is_finished() {
        std::thread::sleep(Duration::from_secs(1));
        if let Some(report) = channels.drain_reports().last() {
            println!(
                "[{:6.2}s] {:<11} ball {} -> setpoint {} ({} left)",
                begin.elapsed().as_secs_f64(),
                report.phase.to_string(),
                report.reading.position,
                report.setpoint,
                report.checkpoints_remaining
            );
        }
    }

    stats.shutdown.store(true, Ordering::Relaxed);
    match handle.join() {
        Ok(result) => result?,
        Err(_) => error!("control thread panicked"),
    }

    println!("\n===========================================");
    println!("FINAL RUN RESULTS");
    println!("===========================================");
    println!("Phase: {}", stats.phase());
    println!(
        "Checkpoints remaining: {} of {}",
        stats.checkpoints_remaining.load(Ordering::Relaxed),
        maze.checkpoints.len()
    );
    println!("Control ticks: {}", stats.control_ticks.load(Ordering::Relaxed));
    println!("Commands sent: {}", actuator.len());
    println!("Reports dropped: {}", channels.dropped_reports());

    let report = metrics.report();
    println!("\n=== Timing Metrics ===");
    println!("Perception P50: {:?}, P99: {:?}", report.perception_p50, report.perception_p99);
    println!("Control P50: {:?}, P99: {:?}", report.control_p50, report.control_p99);
    println!("Step P50: {:?}, P99: {:?}", report.step_p50, report.step_p99);
    println!("Jitter P50: {:?}, P99: {:?}", report.jitter_p50, report.jitter_p99);
    println!("Missed deadlines: {} of {}", report.missed_deadlines, report.control_ticks);

    render_timing_chart(&report, "timing_chart.svg")?;
    performance_log.export("performance_log.txt")?;
    println!("\nWrote timing_chart.svg and performance_log.txt");
    Ok(())
}
