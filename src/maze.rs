//! Checkpoints and the built-in maze layouts

use std::f64::consts::PI;
use std::time::Duration;

use crate::config::{seconds, CheckpointSpec};
use crate::error::{LabyrinthError, Result};
use crate::vector::Vector2;

/// Per-checkpoint overrides of the default capture behaviour. Unset fields
/// fall back to the handler's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointOverride {
    pub radius_mm: Option<f64>,
    pub dwell: Option<Duration>,
    /// Command sent to the actuators instead of the PID output while this
    /// checkpoint is the setpoint.
    pub forced_command: Option<Vector2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub position: Vector2,
    pub special: Option<CheckpointOverride>,
}

impl Checkpoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Vector2::new(x, y),
            special: None,
        }
    }

    pub fn special(position: Vector2, radius_mm: f64, dwell: Duration) -> Self {
        Self {
            position,
            special: Some(CheckpointOverride {
                radius_mm: Some(radius_mm),
                dwell: Some(dwell),
                forced_command: None,
            }),
        }
    }

    pub fn with_forced_command(mut self, command: Vector2) -> Self {
        self.special.get_or_insert_with(CheckpointOverride::default).forced_command = Some(command);
        self
    }

    pub fn from_spec(spec: &CheckpointSpec) -> Result<Self> {
        let position = Vector2::new(spec.x, spec.y);
        if !position.is_finite() {
            return Err(LabyrinthError::InvalidConfig(format!(
                "checkpoint {position} is not finite"
            )));
        }
        let is_special =
            spec.radius_mm.is_some() || spec.dwell_s.is_some() || spec.forced_command.is_some();
        if !is_special {
            return Ok(Self { position, special: None });
        }

        if let Some(radius_mm) = spec.radius_mm {
            if !(radius_mm.is_finite() && radius_mm > 0.0) {
                return Err(LabyrinthError::InvalidConfig(format!(
                    "checkpoint {position} radius must be positive"
                )));
            }
        }
        let dwell = spec
            .dwell_s
            .map(|s| seconds(&format!("checkpoint {position} dwell"), s))
            .transpose()?;
        Ok(Self {
            position,
            special: Some(CheckpointOverride {
                radius_mm: spec.radius_mm,
                dwell,
                forced_command: spec.forced_command,
            }),
        })
    }

    pub fn radius_mm(&self, default: f64) -> f64 {
        self.special.as_ref().and_then(|s| s.radius_mm).unwrap_or(default)
    }

    pub fn dwell(&self, default: Duration) -> Duration {
        self.special.as_ref().and_then(|s| s.dwell).unwrap_or(default)
    }

    pub fn forced_command(&self) -> Option<Vector2> {
        self.special.as_ref().and_then(|s| s.forced_command)
    }
}

/// An ordered checkpoint path. Order encodes the route through the maze.
#[derive(Debug, Clone)]
pub struct Maze {
    pub name: String,
    pub checkpoints: Vec<Checkpoint>,
}

impl Maze {
    pub fn new(name: impl Into<String>, checkpoints: Vec<Checkpoint>) -> Result<Self> {
        if checkpoints.is_empty() {
            return Err(LabyrinthError::EmptyMaze);
        }
        Ok(Self {
            name: name.into(),
            checkpoints,
        })
    }

    pub fn builtin(name: &str) -> Result<Self> {
        match name {
            "sandbox" => Ok(Self::sandbox()),
            "simple" => Ok(Self::simple()),
            "circle" => Ok(Self::circle()),
            other => Err(LabyrinthError::UnknownMaze(other.to_string())),
        }
    }

    /// Single checkpoint in the far corner, for tuning runs.
    pub fn sandbox() -> Self {
        Self {
            name: "sandbox".to_string(),
            checkpoints: vec![Checkpoint::new(280.0, 240.0)],
        }
    }

    /// Serpentine route between the two internal walls.
    pub fn simple() -> Self {
        let points = [
            (65.0, 50.0),
            (65.0, 220.0),
            (160.0, 220.0),
            (160.0, 50.0),
            (270.0, 50.0),
            (270.0, 220.0),
        ];
        Self {
            name: "simple".to_string(),
            checkpoints: points.iter().map(|&(x, y)| Checkpoint::new(x, y)).collect(),
        }
    }

    /// Sixteen checkpoints on a 50 mm circle around the board centre.
    pub fn circle() -> Self {
        let checkpoints = (0..16)
            .map(|i| {
                let theta = i as f64 * PI / 8.0;
                Checkpoint::new(166.0 + 50.0 * theta.sin(), 143.0 + 50.0 * theta.cos())
            })
            .collect();
        Self {
            name: "circle".to_string(),
            checkpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_maze_is_rejected() {
        assert!(matches!(Maze::new("x", vec![]), Err(LabyrinthError::EmptyMaze)));
    }

    #[test]
    fn circle_has_sixteen_points_on_radius() {
        let maze = Maze::circle();
        assert_eq!(maze.checkpoints.len(), 16);
        let centre = Vector2::new(166.0, 143.0);
        for cp in &maze.checkpoints {
            assert!((cp.position.distance(centre) - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn partial_override_fills_from_defaults() {
        let spec = CheckpointSpec {
            x: 10.0,
            y: 20.0,
            radius_mm: None,
            dwell_s: Some(0.0),
            forced_command: None,
        };
        let cp = Checkpoint::from_spec(&spec).unwrap();
        assert_eq!(cp.radius_mm(5.0), 5.0);
        assert_eq!(cp.dwell(Duration::from_millis(500)), Duration::ZERO);
    }

    #[test]
    fn negative_dwell_is_rejected() {
        let spec = CheckpointSpec {
            x: 0.0,
            y: 0.0,
            radius_mm: None,
            dwell_s: Some(-1.0),
            forced_command: None,
        };
        assert!(Checkpoint::from_spec(&spec).is_err());
    }

    #[test]
    fn forced_command_keeps_default_capture_rules() {
        let cp = Checkpoint::new(50.0, 50.0).with_forced_command(Vector2::new(0.1, 0.0));
        assert_eq!(cp.forced_command(), Some(Vector2::new(0.1, 0.0)));
        assert_eq!(cp.radius_mm(5.0), 5.0);
        assert_eq!(cp.dwell(Duration::from_millis(500)), Duration::from_millis(500));
    }
}
