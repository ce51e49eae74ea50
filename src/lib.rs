pub mod analysis;
pub mod config;
pub mod control;
pub mod error;
pub mod interfaces;
pub mod maze;
pub mod metrics;
pub mod perception;
pub mod runner;
pub mod scheduler;
pub mod synthetic;
pub mod telemetry;
pub mod vector;

pub use config::{load_config, LabyrinthConfig};
pub use error::{LabyrinthError, Result};
pub use runner::{spawn_control_thread, ControlLoop, LoopStats};
pub use vector::Vector2;
