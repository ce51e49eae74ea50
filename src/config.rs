//! Runtime configuration - immutable tuning constants loaded from TOML

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LabyrinthError, Result};
use crate::maze::{Checkpoint, Maze};
use crate::vector::Vector2;

// ============================================================================
// TIMING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub control_frequency_hz: f64,
    pub presentation_frequency_hz: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_frequency_hz: 20.0,
            presentation_frequency_hz: 10.0,
        }
    }
}

impl TimingConfig {
    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.control_frequency_hz)
    }

    pub fn presentation_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.presentation_frequency_hz)
    }
}

// ============================================================================
// PID
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Static-friction boost magnitude (rad).
    pub ks: f64,
    /// Boost decay rate; larger values shorten the boost once the ball moves.
    pub kst: f64,
    /// Error-history length used for the least-squares derivative.
    pub buffer_size: usize,
    /// Per-axis actuator command limit, in actuator units.
    pub saturation_limit: Vector2,
    /// Smallest non-zero platform angle the servos can realise (rad).
    pub min_angle: Vector2,
    /// Platform angle to actuator angle ratio per axis.
    pub gearing: Vector2,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.0005,
            ki: 0.0001,
            kd: 0.0003,
            ks: 0.004,
            kst: 0.05,
            buffer_size: 5,
            saturation_limit: Vector2::new(0.785, 0.785),
            min_angle: Vector2::new(0.002, 0.002),
            gearing: Vector2::new(20.0 / 3.0, 10.0),
        }
    }
}

// ============================================================================
// CALIBRATION & CHECKPOINT DEFAULTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Trailing window the ball must stay still for (seconds).
    pub window_s: f64,
    /// Allowed per-axis deviation from the window's first sample (mm).
    pub tolerance_mm: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_s: 2.5,
            tolerance_mm: 2.0,
        }
    }
}

impl CalibrationConfig {
    pub fn window(&self) -> Result<Duration> {
        seconds("calibration.window_s", self.window_s)
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("calibration.window_s", self.window_s)?;
        self.window()?;
        require_non_negative("calibration.tolerance_mm", self.tolerance_mm)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointDefaults {
    pub radius_mm: f64,
    pub dwell_s: f64,
}

impl Default for CheckpointDefaults {
    fn default() -> Self {
        Self {
            radius_mm: 5.0,
            dwell_s: 0.5,
        }
    }
}

impl CheckpointDefaults {
    pub fn dwell(&self) -> Result<Duration> {
        seconds("checkpoints.dwell_s", self.dwell_s)
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("checkpoints.radius_mm", self.radius_mm)?;
        self.dwell()?;
        Ok(())
    }
}

// ============================================================================
// VISION
// ============================================================================

/// Inclusive HSV bounds using the 0-180 hue / 0-255 saturation and value scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Brown-Conrady lens model from the camera's checkerboard calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LensCalibration {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width_mm: f64,
    pub height_mm: f64,
    /// Resolution of the geometry-corrected image.
    pub pixels_per_mm: f64,
    /// Physical coordinate of the marker quadrilateral's top-left corner.
    pub origin_mm: Vector2,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width_mm: 274.5,
            height_mm: 229.5,
            pixels_per_mm: 2.0,
            origin_mm: Vector2::new(28.75, 28.25),
        }
    }
}

impl SurfaceConfig {
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width_mm * self.pixels_per_mm).round() as u32,
            (self.height_mm * self.pixels_per_mm).round() as u32,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub hsv: HsvRange,
    /// Contours shorter than this are treated as noise (px).
    pub min_perimeter_px: f64,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_fraction: f64,
    /// Corners to use before the first successful detection, ordered
    /// clockwise from the top-left.
    pub initial_corners: Option<[[f32; 2]; 4]>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            hsv: HsvRange {
                lower: [35, 52, 72],
                upper: [85, 255, 255],
            },
            min_perimeter_px: 400.0,
            approx_epsilon_fraction: 0.02,
            initial_corners: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BallDetectionConfig {
    pub hsv: HsvRange,
    /// Contours enclosing less area than this are ignored (px^2).
    pub min_area_px: f64,
    /// Radius of the square erode/dilate structuring element (px).
    pub morphology_radius: u8,
}

impl Default for BallDetectionConfig {
    fn default() -> Self {
        Self {
            hsv: HsvRange {
                lower: [94, 80, 2],
                upper: [126, 255, 255],
            },
            min_area_px: 30.0,
            morphology_radius: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub lens: Option<LensCalibration>,
    pub surface: SurfaceConfig,
    pub marker: MarkerConfig,
    pub ball: BallDetectionConfig,
    /// Grace window before a missing ball is reported as lost (seconds).
    pub wait_time_s: f64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            lens: None,
            surface: SurfaceConfig::default(),
            marker: MarkerConfig::default(),
            ball: BallDetectionConfig::default(),
            wait_time_s: 0.5,
        }
    }
}

impl VisionConfig {
    pub fn wait_time(&self) -> Result<Duration> {
        seconds("vision.wait_time_s", self.wait_time_s)
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("vision.surface.width_mm", self.surface.width_mm)?;
        require_positive("vision.surface.height_mm", self.surface.height_mm)?;
        require_positive("vision.surface.pixels_per_mm", self.surface.pixels_per_mm)?;
        if !self.surface.origin_mm.is_finite() {
            return Err(invalid("vision.surface.origin_mm must be finite"));
        }
        self.wait_time()?;
        require_non_negative("vision.marker.min_perimeter_px", self.marker.min_perimeter_px)?;
        require_positive(
            "vision.marker.approx_epsilon_fraction",
            self.marker.approx_epsilon_fraction,
        )?;
        require_non_negative("vision.ball.min_area_px", self.ball.min_area_px)?;
        require_ordered("vision.marker.hsv", &self.marker.hsv)?;
        require_ordered("vision.ball.hsv", &self.ball.hsv)?;
        if let Some(lens) = &self.lens {
            require_positive("vision.lens.fx", lens.fx)?;
            require_positive("vision.lens.fy", lens.fy)?;
        }
        Ok(())
    }
}

// ============================================================================
// MAZE & TELEMETRY
// ============================================================================

/// A checkpoint as written in the config file. Any override field makes the
/// checkpoint special.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSpec {
    pub x: f64,
    pub y: f64,
    pub radius_mm: Option<f64>,
    pub dwell_s: Option<f64>,
    pub forced_command: Option<Vector2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MazeConfig {
    /// Name of a built-in maze, used when `checkpoints` is empty.
    pub builtin: String,
    pub checkpoints: Vec<CheckpointSpec>,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            builtin: "simple".to_string(),
            checkpoints: Vec::new(),
        }
    }
}

impl MazeConfig {
    pub fn resolve(&self) -> Result<Maze> {
        if self.checkpoints.is_empty() {
            return Maze::builtin(&self.builtin);
        }
        let checkpoints = self
            .checkpoints
            .iter()
            .map(Checkpoint::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Maze::new("custom", checkpoints)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub channel_capacity: usize,
    pub performance_log_entries: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            performance_log_entries: 30,
        }
    }
}

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabyrinthConfig {
    pub timing: TimingConfig,
    pub pid: PidConfig,
    pub calibration: CalibrationConfig,
    pub checkpoints: CheckpointDefaults,
    pub vision: VisionConfig,
    pub maze: MazeConfig,
    pub telemetry: TelemetryConfig,
}

fn invalid(msg: impl Into<String>) -> LabyrinthError {
    LabyrinthError::InvalidConfig(msg.into())
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be non-negative, got {value}")))
    }
}

/// Seconds as a `Duration`, rejecting negative, non-finite and overflowing
/// values.
pub(crate) fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| invalid(format!("{name}: {e}")))
}

fn require_ordered(name: &str, range: &HsvRange) -> Result<()> {
    if (0..3).all(|i| range.lower[i] <= range.upper[i]) {
        Ok(())
    } else {
        Err(invalid(format!("{name} lower bound exceeds upper bound")))
    }
}

impl LabyrinthConfig {
    /// Reject malformed values up front so the control loop never meets them.
    pub fn validate(&self) -> Result<()> {
        require_positive("timing.control_frequency_hz", self.timing.control_frequency_hz)?;
        require_positive(
            "timing.presentation_frequency_hz",
            self.timing.presentation_frequency_hz,
        )?;

        let pid = &self.pid;
        for (name, gain) in [("kp", pid.kp), ("ki", pid.ki), ("kd", pid.kd), ("ks", pid.ks), ("kst", pid.kst)] {
            require_non_negative(&format!("pid.{name}"), gain)?;
        }
        if pid.buffer_size < 2 {
            return Err(invalid("pid.buffer_size must be at least 2"));
        }
        for (name, v) in [
            ("pid.saturation_limit", pid.saturation_limit),
            ("pid.gearing", pid.gearing),
        ] {
            require_positive(&format!("{name}.x"), v.x)?;
            require_positive(&format!("{name}.y"), v.y)?;
        }
        require_non_negative("pid.min_angle.x", pid.min_angle.x)?;
        require_non_negative("pid.min_angle.y", pid.min_angle.y)?;

        self.calibration.validate()?;
        self.checkpoints.validate()?;
        self.vision.validate()?;

        if self.telemetry.channel_capacity == 0 {
            return Err(invalid("telemetry.channel_capacity must be at least 1"));
        }

        // Resolving the maze checks every checkpoint and rejects an empty list.
        self.maze.resolve()?;
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: LabyrinthConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// CONFIG FILE LOADING
// ============================================================================

/// Load and validate a config file. A missing file yields the defaults; a
/// file that exists but is malformed is an error.
pub fn load_config(path: impl AsRef<Path>) -> Result<LabyrinthConfig> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(s) => LabyrinthConfig::from_toml_str(&s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "config file not found, using defaults");
            let config = LabyrinthConfig::default();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}
