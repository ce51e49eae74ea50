//! Collaborator seams - camera, actuators, time and maze data

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use parking_lot::Mutex;

use crate::config::{LabyrinthConfig, VisionConfig};
use crate::error::Result;
use crate::maze::Maze;
use crate::vector::Vector2;

// ============================================================================
// TRAITS
// ============================================================================

/// Blocking frame acquisition. An error ends the run.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<RgbImage>;
}

/// Receives tilt commands in actuator units. Never waits for the motion.
pub trait ActuatorSink: Send {
    fn apply_tilt(&mut self, command: Vector2);
}

/// Monotonic time source.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Supplies the route and the camera geometry for one physical maze.
pub trait MazeSource {
    fn maze(&self) -> Result<Maze>;
    fn vision(&self) -> &VisionConfig;
}

impl MazeSource for LabyrinthConfig {
    fn maze(&self) -> Result<Maze> {
        self.maze.resolve()
    }

    fn vision(&self) -> &VisionConfig {
        &self.vision
    }
}

// ============================================================================
// CLOCKS
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: Instant) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

// ============================================================================
// ACTUATORS
// ============================================================================

/// Keeps every command it receives. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    commands: Arc<Mutex<Vec<Vector2>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Vector2> {
        self.commands.lock().clone()
    }

    pub fn last(&self) -> Option<Vector2> {
        self.commands.lock().last().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

impl ActuatorSink for RecordingActuator {
    fn apply_tilt(&mut self, command: Vector2) {
        self.commands.lock().push(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let start = Instant::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), start + Duration::from_millis(250));
    }

    #[test]
    fn default_config_resolves_simple_maze() {
        let cfg = LabyrinthConfig::default();
        assert_eq!(cfg.maze().unwrap().checkpoints.len(), 6);
        assert_eq!(cfg.vision().wait_time_s, 0.5);
    }
}
