//! Perception module - Camera frame to ball position on the playing surface

pub mod ball;
pub mod estimator;
pub mod lens;
pub mod segmentation;
pub mod surface;

pub use ball::{locate_ball, BallCandidate};
pub use estimator::{BallReading, PositionEstimator};
pub use lens::LensCorrector;
pub use surface::{Quad, SurfaceFix, SurfaceLocator};
