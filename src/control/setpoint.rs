use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::CheckpointDefaults;
use crate::error::{LabyrinthError, Result};
use crate::maze::Checkpoint;
use crate::vector::Vector2;

/// Progress towards the checkpoint at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellState {
    Approaching,
    Dwelling { entered: Instant },
}

/// What one setpoint update decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetpointUpdate {
    Approaching,
    Dwelling { entered: Instant },
    /// The head checkpoint was captured and `next` is the new setpoint.
    Advanced { next: Vector2 },
    /// The final checkpoint was captured, now or earlier.
    MazeCompleted,
}

impl SetpointUpdate {
    /// True on the tick the active checkpoint is captured.
    pub fn captured(&self) -> bool {
        matches!(self, SetpointUpdate::Advanced { .. })
    }
}

/// Owns the checkpoint queue and decides when the ball has reached the
/// current one.
pub struct SetpointHandler {
    checkpoints: VecDeque<Checkpoint>,
    default_radius_mm: f64,
    default_dwell: Duration,
    state: DwellState,
    last_target: Vector2,
    completed: bool,
}

impl SetpointHandler {
    pub fn new(checkpoints: impl IntoIterator<Item = Checkpoint>, defaults: &CheckpointDefaults) -> Result<Self> {
        defaults.validate()?;
        let checkpoints: VecDeque<Checkpoint> = checkpoints.into_iter().collect();
        let first = checkpoints.front().ok_or(LabyrinthError::EmptyMaze)?;
        Ok(Self {
            last_target: first.position,
            checkpoints,
            default_radius_mm: defaults.radius_mm,
            default_dwell: defaults.dwell()?,
            state: DwellState::Approaching,
            completed: false,
        })
    }

    /// Checkpoint currently being pursued, if any remain.
    pub fn current(&self) -> Option<&Checkpoint> {
        self.checkpoints.front()
    }

    /// Target position. After completion this is the final checkpoint.
    pub fn setpoint(&self) -> Vector2 {
        self.current().map_or(self.last_target, |c| c.position)
    }

    pub fn remaining(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn state(&self) -> DwellState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn capture_rules(&self, checkpoint: &Checkpoint) -> (f64, Duration) {
        (checkpoint.radius_mm(self.default_radius_mm), checkpoint.dwell(self.default_dwell))
    }

    pub fn update(&mut self, position: Vector2, now: Instant) -> SetpointUpdate {
        let Some(checkpoint) = self.checkpoints.front() else {
            return SetpointUpdate::MazeCompleted;
        };
        let (radius, dwell) = self.capture_rules(checkpoint);
        let target = checkpoint.position;

        if position.distance(target) >= radius {
            self.state = DwellState::Approaching;
            return SetpointUpdate::Approaching;
        }

        let entered = match self.state {
            DwellState::Dwelling { entered } => entered,
            DwellState::Approaching => {
                self.state = DwellState::Dwelling { entered: now };
                now
            }
        };
        if now.saturating_duration_since(entered) < dwell {
            return SetpointUpdate::Dwelling { entered };
        }

        self.checkpoints.pop_front();
        self.state = DwellState::Approaching;
        self.last_target = target;
        match self.checkpoints.front() {
            Some(next) => {
                info!(captured = %target, next = %next.position, remaining = self.checkpoints.len(), "checkpoint captured");
                SetpointUpdate::Advanced { next: next.position }
            }
            None => {
                info!(captured = %target, "maze completed");
                self.completed = true;
                SetpointUpdate::MazeCompleted
            }
        }
    }
}
