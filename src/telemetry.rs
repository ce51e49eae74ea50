//! Telemetry module - Per-tick reports, run phases and the performance log

pub mod channels;
pub mod performance_log;

use std::fmt;
use std::time::Instant;

use crate::control::{CalibrationStatus, PidOutput, Saturation};
use crate::perception::BallReading;
use crate::vector::Vector2;

pub use channels::{LoopCommand, TelemetryChannels};
pub use performance_log::PerformanceLog;

// ============================================================================
// RUN PHASE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Learning the level offset before the route starts.
    Calibrating,
    Running,
    /// Actuation frozen by the operator.
    Paused,
    /// The ball left the camera's view for longer than the grace window.
    BallLost,
    Completed,
}

impl RunPhase {
    /// Phases in which tilt commands reach the actuators.
    pub fn actuates(&self) -> bool {
        matches!(self, RunPhase::Calibrating | RunPhase::Running)
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RunPhase::Calibrating => 0,
            RunPhase::Running => 1,
            RunPhase::Paused => 2,
            RunPhase::BallLost => 3,
            RunPhase::Completed => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RunPhase::Calibrating),
            1 => Some(RunPhase::Running),
            2 => Some(RunPhase::Paused),
            3 => Some(RunPhase::BallLost),
            4 => Some(RunPhase::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Calibrating => write!(f, "Calibrating"),
            RunPhase::Running => write!(f, "Running"),
            RunPhase::Paused => write!(f, "Paused"),
            RunPhase::BallLost => write!(f, "Ball lost"),
            RunPhase::Completed => write!(f, "Completed"),
        }
    }
}

// ============================================================================
// TICK REPORT - What the loop exposes after each control tick
// ============================================================================

#[derive(Debug, Clone)]
pub struct TickReport {
    pub timestamp: Instant,
    pub tick: u64,
    pub phase: RunPhase,
    pub reading: BallReading,
    pub setpoint: Vector2,
    /// Controller output for this tick, absent when the controller did not run.
    pub pid: Option<PidOutput>,
    /// Command handed to the actuators, absent while actuation is frozen.
    pub applied: Option<Vector2>,
    pub calibration: Option<CalibrationStatus>,
    pub checkpoints_remaining: usize,
    pub maze_completed: bool,
}

impl TickReport {
    pub fn saturation(&self) -> Saturation {
        self.pid.map(|p| p.saturation).unwrap_or_default()
    }

    /// P, I and D contributions, zero when the controller did not run.
    pub fn terms(&self) -> (Vector2, Vector2, Vector2) {
        self.pid
            .map(|p| (p.proportional, p.integral, p.derivative))
            .unwrap_or((Vector2::ZERO, Vector2::ZERO, Vector2::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_phases_actuate() {
        assert!(RunPhase::Running.actuates());
        assert!(RunPhase::Calibrating.actuates());
        assert!(!RunPhase::BallLost.actuates());
        assert!(!RunPhase::Paused.actuates());
    }
}
