//! Control loop runner - one cooperative loop owning every piece of core state

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::config::LabyrinthConfig;
use crate::control::{Calibrator, PidController, SetpointHandler, SetpointUpdate};
use crate::error::Result;
use crate::interfaces::{ActuatorSink, Clock, FrameSource, MazeSource};
use crate::maze::Maze;
use crate::metrics::TimingMetrics;
use crate::perception::PositionEstimator;
use crate::scheduler::Scheduler;
use crate::telemetry::{LoopCommand, PerformanceLog, RunPhase, TelemetryChannels, TickReport};
use crate::vector::Vector2;

// ============================================================================
// LOOP STATS - Shared with whoever spawned the loop
// ============================================================================

pub struct LoopStats {
    pub iterations: AtomicU64,
    pub control_ticks: AtomicU64,
    pub reports_published: AtomicU64,
    pub checkpoints_remaining: AtomicU64,
    phase: AtomicU8,
    pub shutdown: AtomicBool,
}

impl LoopStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            iterations: AtomicU64::new(0),
            control_ticks: AtomicU64::new(0),
            reports_published: AtomicU64::new(0),
            checkpoints_remaining: AtomicU64::new(0),
            phase: AtomicU8::new(RunPhase::Calibrating.as_u8()),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Relaxed)).unwrap_or(RunPhase::Calibrating)
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase.as_u8(), Ordering::Relaxed);
    }
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

pub struct ControlLoop<F, A, C> {
    config: LabyrinthConfig,
    maze: Maze,
    camera: F,
    actuator: A,
    clock: C,
    scheduler: Scheduler,
    estimator: PositionEstimator,
    calibrator: Calibrator,
    setpoints: SetpointHandler,
    pid: PidController,
    phase: RunPhase,
    resume_phase: RunPhase,
    last_command: Vector2,
    control_ticks: u64,
    latest: Option<TickReport>,
    metrics: TimingMetrics,
    log: PerformanceLog,
    telemetry: Option<TelemetryChannels>,
    stats: Arc<LoopStats>,
}

impl<F: FrameSource, A: ActuatorSink, C: Clock> ControlLoop<F, A, C> {
    pub fn new(config: LabyrinthConfig, camera: F, actuator: A, clock: C) -> Result<Self> {
        config.validate()?;
        let maze = config.maze()?;
        let now = clock.now();

        let setpoints = SetpointHandler::new(maze.checkpoints.iter().cloned(), &config.checkpoints)?;
        let pid = PidController::new(&config.pid, setpoints.setpoint());
        let stats = LoopStats::new();
        stats
            .checkpoints_remaining
            .store(setpoints.remaining() as u64, Ordering::Relaxed);

        info!(maze = %maze.name, checkpoints = maze.checkpoints.len(), "control loop ready");
        Ok(Self {
            scheduler: Scheduler::new(&config.timing, now),
            estimator: PositionEstimator::new(config.vision(), now)?,
            calibrator: Calibrator::new(&config.calibration)?,
            metrics: TimingMetrics::new(config.timing.control_period())?,
            log: PerformanceLog::new(config.telemetry.performance_log_entries, now),
            setpoints,
            pid,
            phase: RunPhase::Calibrating,
            resume_phase: RunPhase::Calibrating,
            last_command: Vector2::ZERO,
            control_ticks: 0,
            latest: None,
            telemetry: None,
            stats,
            maze,
            camera,
            actuator,
            clock,
            config,
        })
    }

    /// Publish reports on presentation ticks and accept operator commands.
    pub fn with_telemetry(mut self, channels: TelemetryChannels) -> Self {
        self.telemetry = Some(channels);
        self
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "phase change");
        }
        self.phase = phase;
        self.stats.set_phase(phase);
    }

    fn actuate(&mut self, command: Vector2) -> Vector2 {
        self.actuator.apply_tilt(command);
        self.last_command = command;
        command
    }

    // ------------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------------

    /// Freeze actuation. Has no effect unless the loop is calibrating or running.
    pub fn pause(&mut self) {
        if self.phase.actuates() {
            info!(phase = %self.phase, "paused");
            self.resume_phase = self.phase;
            self.set_phase(RunPhase::Paused);
        }
    }

    /// Continue after a pause with a cleared controller memory.
    pub fn resume(&mut self) {
        if self.phase == RunPhase::Paused {
            self.pid.reset();
            info!(phase = %self.resume_phase, "resumed");
            self.set_phase(self.resume_phase);
        }
    }

    /// Start the route again from the first checkpoint, recalibrating and
    /// levelling the platform.
    pub fn restart(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.estimator = PositionEstimator::new(self.config.vision(), now)?;
        self.calibrator.reset();
        self.setpoints =
            SetpointHandler::new(self.maze.checkpoints.iter().cloned(), &self.config.checkpoints)?;
        self.pid = PidController::new(&self.config.pid, self.setpoints.setpoint());
        self.latest = None;
        self.actuate(Vector2::ZERO);
        self.stats
            .checkpoints_remaining
            .store(self.setpoints.remaining() as u64, Ordering::Relaxed);
        self.set_phase(RunPhase::Calibrating);
        info!(maze = %self.maze.name, "restarted");
        Ok(())
    }

    pub fn handle_command(&mut self, command: LoopCommand) -> Result<()> {
        match command {
            LoopCommand::Pause => self.pause(),
            LoopCommand::Resume => self.resume(),
            LoopCommand::Restart => self.restart()?,
        }
        Ok(())
    }

    fn drain_commands(&mut self) -> Result<()> {
        let pending: Vec<LoopCommand> = match &self.telemetry {
            Some(channels) => channels.command_rx.try_iter().collect(),
            None => return Ok(()),
        };
        for command in pending {
            self.handle_command(command)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Loop body
    // ------------------------------------------------------------------------

    /// One loop iteration. Returns a report when control work ran.
    pub fn tick(&mut self) -> Result<Option<TickReport>> {
        let now = self.clock.now();
        let schedule = self.scheduler.update(now);
        self.stats.iterations.fetch_add(1, Ordering::Relaxed);

        if schedule.control_due || schedule.presentation_due {
            self.log
                .update(schedule.control_due, schedule.presentation_due, now);
        }

        let report = if schedule.control_due {
            self.metrics.record_step(schedule.control_elapsed);
            Some(self.control_tick(now, schedule.control_elapsed)?)
        } else {
            None
        };

        if schedule.presentation_due {
            if let (Some(channels), Some(latest)) = (&self.telemetry, &self.latest) {
                if channels.publish(latest.clone()) {
                    self.stats.reports_published.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(report)
    }

    fn control_tick(&mut self, now: Instant, elapsed: Duration) -> Result<TickReport> {
        let work_start = Instant::now();
        let frame = self.camera.next_frame()?;

        let perception_start = Instant::now();
        let reading = self.estimator.update(now, &frame);
        self.metrics.record_perception(perception_start.elapsed());

        if self.phase.actuates() && !reading.active {
            info!(phase = %self.phase, last = %reading.position, "ball lost, actuation frozen");
            self.set_phase(RunPhase::BallLost);
        }

        let mut pid = None;
        let mut applied = None;
        let mut calibration = None;

        match self.phase {
            RunPhase::Calibrating => {
                let status = self
                    .calibrator
                    .update(reading.position, self.last_command, now);
                calibration = Some(status);
                if status.done {
                    self.pid.calibrate(status.level_offset);
                    info!(level_offset = %status.level_offset, "calibrated, starting route");
                    self.set_phase(RunPhase::Running);
                }
                let output = self.pid.update(reading.position, elapsed);
                applied = Some(self.actuate(output.command));
                pid = Some(output);
            }
            RunPhase::Running => {
                match self.setpoints.update(reading.position, now) {
                    SetpointUpdate::Advanced { next } => self.pid.new_setpoint(next),
                    SetpointUpdate::MazeCompleted => self.set_phase(RunPhase::Completed),
                    SetpointUpdate::Approaching | SetpointUpdate::Dwelling { .. } => {}
                }
                if self.phase == RunPhase::Running {
                    let output = self.pid.update(reading.position, elapsed);
                    let forced = self.setpoints.current().and_then(|c| c.forced_command());
                    applied = Some(self.actuate(forced.unwrap_or(output.command)));
                    pid = Some(output);
                }
            }
            RunPhase::Paused | RunPhase::BallLost | RunPhase::Completed => {}
        }

        self.metrics.record_control(work_start.elapsed());
        self.control_ticks += 1;
        self.stats.control_ticks.fetch_add(1, Ordering::Relaxed);
        self.stats
            .checkpoints_remaining
            .store(self.setpoints.remaining() as u64, Ordering::Relaxed);

        let report = TickReport {
            timestamp: now,
            tick: self.control_ticks,
            phase: self.phase,
            reading,
            setpoint: self.setpoints.setpoint(),
            pid,
            applied,
            calibration,
            checkpoints_remaining: self.setpoints.remaining(),
            maze_completed: self.setpoints.is_completed(),
        };
        debug!(
            tick = report.tick,
            phase = %report.phase,
            position = %reading.position,
            active = reading.active,
            "control tick"
        );
        self.latest = Some(report.clone());
        Ok(report)
    }

    /// Iterate until `stop` is raised or the frame source fails.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        let idle = (self.scheduler.control_period() / 20).max(Duration::from_micros(200));
        info!("control loop running");
        while !stop.load(Ordering::Relaxed) {
            self.drain_commands()?;
            if self.tick()?.is_none() {
                thread::sleep(idle);
            }
        }
        info!(control_ticks = self.control_ticks, phase = %self.phase, "control loop stopped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn latest(&self) -> Option<&TickReport> {
        self.latest.as_ref()
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn setpoints(&self) -> &SetpointHandler {
        &self.setpoints
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn metrics(&self) -> TimingMetrics {
        self.metrics.clone()
    }

    pub fn performance_log(&self) -> PerformanceLog {
        self.log.clone()
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        self.stats.clone()
    }

    pub fn camera_mut(&mut self) -> &mut F {
        &mut self.camera
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Run the loop on its own thread until `stats.shutdown` is raised.
pub fn spawn_control_thread<F, A, C>(
    control: ControlLoop<F, A, C>,
) -> (thread::JoinHandle<Result<()>>, Arc<LoopStats>)
where
    F: FrameSource + 'static,
    A: ActuatorSink + 'static,
    C: Clock + 'static,
{
    let stats = control.stats();
    let stats_clone = stats.clone();

    let handle = thread::spawn(move || {
        let mut control = control;
        let result = control.run(&stats_clone.shutdown);
        if let Err(e) = &result {
            error!(error = %e, "control loop aborted");
        }
        result
    });

    (handle, stats)
}
