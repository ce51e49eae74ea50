use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use crate::config::PidConfig;
use crate::vector::{sign, Vector2};

// ============================================================================
// MODE & OUTPUT TYPES
// ============================================================================

/// Calibration state of the controller. The static-friction boost, the
/// minimum-angle floor and the level offset only apply once calibrated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerMode {
    Uncalibrated,
    Calibrated { level_offset: Vector2 },
}

impl ControllerMode {
    pub fn level_offset(&self) -> Vector2 {
        match self {
            ControllerMode::Uncalibrated => Vector2::ZERO,
            ControllerMode::Calibrated { level_offset } => *level_offset,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, ControllerMode::Calibrated { .. })
    }
}

/// Per-axis record of whether the last command hit its limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Saturation {
    pub x: bool,
    pub y: bool,
}

impl Saturation {
    pub fn any(&self) -> bool {
        self.x || self.y
    }

    pub fn both(&self) -> bool {
        self.x && self.y
    }
}

/// Everything one control update produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    /// Clamped actuator command, level offset included.
    pub command: Vector2,
    pub error: Vector2,
    /// Kp * error.
    pub proportional: Vector2,
    /// Ki * integral.
    pub integral: Vector2,
    /// Kd * filtered error slope.
    pub derivative: Vector2,
    /// Least-squares slope of the buffered error, zero until the buffer fills.
    pub error_rate: Vector2,
    /// Flags from this update's clamp. Anti-windup reads them next update.
    pub saturation: Saturation,
}

// ============================================================================
// LEAST-SQUARES DERIVATIVE
// ============================================================================

/// Slope of the best-fit line through `(t, e)` samples. Returns zero when
/// every sample shares the same time.
pub fn least_squares_slope(samples: impl Iterator<Item = (f64, f64)> + Clone) -> f64 {
    let (n, sum_t, sum_e) = samples
        .clone()
        .fold((0usize, 0.0, 0.0), |(n, st, se), (t, e)| (n + 1, st + t, se + e));
    if n == 0 {
        return 0.0;
    }
    let mean_t = sum_t / n as f64;
    let mean_e = sum_e / n as f64;

    let (num, den) = samples.fold((0.0, 0.0), |(num, den), (t, e)| {
        let dt = t - mean_t;
        (num + dt * (e - mean_e), den + dt * dt)
    });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

// ============================================================================
// PID CONTROLLER
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ErrorSample {
    time: f64,
    error: Vector2,
}

pub struct PidController {
    config: PidConfig,
    mode: ControllerMode,
    setpoint: Vector2,
    integral: Vector2,
    history: VecDeque<ErrorSample>,
    fill_count: usize,
    saturation: Saturation,
}

impl PidController {
    pub fn new(config: &PidConfig, setpoint: Vector2) -> Self {
        Self {
            config: config.clone(),
            mode: ControllerMode::Uncalibrated,
            setpoint,
            integral: Vector2::ZERO,
            history: VecDeque::with_capacity(config.buffer_size),
            fill_count: 0,
            saturation: Saturation::default(),
        }
    }

    /// Pursue a new target. Clears the controller memory but keeps the
    /// calibration.
    pub fn new_setpoint(&mut self, setpoint: Vector2) {
        self.setpoint = setpoint;
        self.reset();
    }

    /// Clear the integral, error history and saturation flags.
    pub fn reset(&mut self) {
        self.integral = Vector2::ZERO;
        self.history.clear();
        self.fill_count = 0;
        self.saturation = Saturation::default();
    }

    /// Switch to calibrated mode with the learned level offset.
    pub fn calibrate(&mut self, level_offset: Vector2) {
        self.mode = ControllerMode::Calibrated { level_offset };
        self.reset();
    }

    pub fn setpoint(&self) -> Vector2 {
        self.setpoint
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn integral_accumulator(&self) -> Vector2 {
        self.integral
    }

    pub fn saturation(&self) -> Saturation {
        self.saturation
    }

    /// Platform angle that produced an actuator command (inverse gearing).
    pub fn theta_from_command(&self, command: Vector2) -> Vector2 {
        (command - self.mode.level_offset()).zip_map(self.config.gearing, |c, g| c / g)
    }

    fn push_error(&mut self, error: Vector2, dt: f64) {
        let time = self.history.back().map_or(0.0, |s| s.time) + dt;
        if self.history.len() == self.config.buffer_size {
            self.history.pop_front();
        }
        self.history.push_back(ErrorSample { time, error });
        self.fill_count += 1;
    }

    fn integrate(&mut self, error: Vector2, dt: f64) {
        let hold = |saturated: bool, e: f64, acc: f64| saturated && sign(e) == sign(acc);
        if !hold(self.saturation.x, error.x, self.integral.x) {
            self.integral.x += error.x * dt;
        }
        if !hold(self.saturation.y, error.y, self.integral.y) {
            self.integral.y += error.y * dt;
        }
    }

    fn error_rate(&self) -> Vector2 {
        if self.fill_count < self.config.buffer_size {
            return Vector2::ZERO;
        }
        let samples = self.history.iter();
        Vector2::new(
            least_squares_slope(samples.clone().map(|s| (s.time, s.error.x))),
            least_squares_slope(samples.map(|s| (s.time, s.error.y))),
        )
    }

    fn clamp(&mut self, command: Vector2) -> Vector2 {
        let limit = self.config.saturation_limit;
        self.saturation = Saturation {
            x: command.x.abs() > limit.x,
            y: command.y.abs() > limit.y,
        };
        Vector2::new(
            command.x.clamp(-limit.x, limit.x),
            command.y.clamp(-limit.y, limit.y),
        )
    }

    pub fn update(&mut self, position: Vector2, elapsed: Duration) -> PidOutput {
        let dt = elapsed.as_secs_f64();
        let error = self.setpoint - position;

        self.push_error(error, dt);
        self.integrate(error, dt);
        let error_rate = self.error_rate();

        let proportional = error * self.config.kp;
        let integral = self.integral * self.config.ki;
        let derivative = error_rate * self.config.kd;
        let mut theta = proportional + integral + derivative;

        if self.mode.is_calibrated() {
            let (ks, kst) = (self.config.ks, self.config.kst);
            theta = theta.zip_map(error_rate, |th, rate| {
                th + ks * sign(th) * (-kst * rate.abs()).exp()
            });
            theta = theta.zip_map(self.config.min_angle, |th, min| {
                if th != 0.0 && th.abs() < min {
                    min * sign(th)
                } else {
                    th
                }
            });
        }

        let geared = theta.scale(self.config.gearing) + self.mode.level_offset();
        let command = self.clamp(geared);
        debug!(%error, %command, saturated = self.saturation.any(), "pid update");

        PidOutput {
            command,
            error,
            proportional,
            integral,
            derivative,
            error_rate,
            saturation: self.saturation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_gains() -> PidConfig {
        PidConfig {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            ks: 0.0,
            kst: 0.0,
            buffer_size: 3,
            saturation_limit: Vector2::splat(1e9),
            min_angle: Vector2::ZERO,
            gearing: Vector2::splat(1.0),
        }
    }

    #[test]
    fn slope_of_flat_time_axis_is_zero() {
        let samples = [(1.0, 3.0), (1.0, 5.0)];
        assert_eq!(least_squares_slope(samples.iter().copied()), 0.0);
    }

    #[test]
    fn slope_of_linear_series() {
        let samples = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        assert_relative_eq!(least_squares_slope(samples.iter().copied()), 2.0);
    }

    #[test]
    fn uncalibrated_output_is_plain_law() {
        let mut pid = PidController::new(&unit_gains(), Vector2::new(10.0, -4.0));
        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        assert_eq!(out.command, Vector2::new(10.0, -4.0));
        assert_eq!(out.derivative, Vector2::ZERO);
    }

    #[test]
    fn min_angle_floor_applies_only_when_calibrated() {
        let mut cfg = unit_gains();
        cfg.kp = 0.001;
        cfg.min_angle = Vector2::splat(0.01);
        let mut pid = PidController::new(&cfg, Vector2::new(1.0, 0.0));

        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        assert_relative_eq!(out.command.x, 0.001);

        pid.calibrate(Vector2::ZERO);
        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        assert_relative_eq!(out.command.x, 0.01);
        // A zero axis stays zero.
        assert_eq!(out.command.y, 0.0);
    }

    #[test]
    fn static_boost_adds_breakaway_term() {
        let mut cfg = unit_gains();
        cfg.kp = 0.01;
        cfg.ks = 0.5;
        cfg.kst = 1.0;
        let mut pid = PidController::new(&cfg, Vector2::new(-1.0, 0.0));
        pid.calibrate(Vector2::ZERO);
        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        // Buffer not full, so the rate is zero and the boost is at full size.
        assert_relative_eq!(out.command.x, -0.01 - 0.5);
    }

    #[test]
    fn level_offset_is_added_after_gearing() {
        let mut cfg = unit_gains();
        cfg.gearing = Vector2::new(2.0, 10.0);
        let mut pid = PidController::new(&cfg, Vector2::new(1.0, 1.0));
        pid.calibrate(Vector2::new(0.5, -0.5));
        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        assert_relative_eq!(out.command.x, 2.5);
        assert_relative_eq!(out.command.y, 9.5);
        let theta = pid.theta_from_command(out.command);
        assert_relative_eq!(theta.x, 1.0);
        assert_relative_eq!(theta.y, 1.0);
    }

    #[test]
    fn clamp_sets_flags_per_axis() {
        let mut cfg = unit_gains();
        cfg.saturation_limit = Vector2::new(2.0, 2.0);
        let mut pid = PidController::new(&cfg, Vector2::new(5.0, 1.0));
        let out = pid.update(Vector2::ZERO, Duration::from_millis(50));
        assert_eq!(out.command, Vector2::new(2.0, 1.0));
        assert_eq!(out.saturation, Saturation { x: true, y: false });
    }

    #[test]
    fn new_setpoint_keeps_calibration() {
        let mut pid = PidController::new(&unit_gains(), Vector2::ZERO);
        pid.calibrate(Vector2::new(0.1, 0.2));
        pid.update(Vector2::new(1.0, 1.0), Duration::from_secs(1));
        pid.new_setpoint(Vector2::new(3.0, 3.0));
        assert_eq!(pid.integral_accumulator(), Vector2::ZERO);
        assert_eq!(pid.saturation(), Saturation::default());
        assert!(pid.mode().is_calibrated());
    }
}
