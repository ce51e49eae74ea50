//! Control module - Calibration, checkpoint sequencing and the PID law

pub mod calibrator;
pub mod pid;
pub mod setpoint;

pub use calibrator::{CalibrationStatus, Calibrator};
pub use pid::{least_squares_slope, ControllerMode, PidController, PidOutput, Saturation};
pub use setpoint::{DwellState, SetpointHandler, SetpointUpdate};
