//! Frame-to-position pipeline with loss tolerance

use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info};

use super::ball::locate_ball;
use super::lens::LensCorrector;
use super::surface::{rectify, SurfaceFix, SurfaceLocator};
use crate::config::{BallDetectionConfig, SurfaceConfig, VisionConfig};
use crate::error::Result;
use crate::vector::Vector2;

/// Result of one perception tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallReading {
    /// False only once the ball has been missing for the whole grace window.
    pub active: bool,
    /// Ball centre in playing-surface millimetres. While the ball is missing
    /// this is the last detected position.
    pub position: Vector2,
    /// Whether the ball was actually seen in this frame.
    pub detected: bool,
    /// Where the surface geometry for this frame came from.
    pub surface: SurfaceFix,
}

pub struct PositionEstimator {
    lens: Option<LensCorrector>,
    locator: SurfaceLocator,
    surface: SurfaceConfig,
    ball: BallDetectionConfig,
    wait_time: Duration,
    last_position: Vector2,
    last_seen: Instant,
    reported_lost: bool,
}

impl PositionEstimator {
    /// The grace window starts at `now`, so a ball that is never seen is
    /// reported lost one wait time after construction.
    pub fn new(config: &VisionConfig, now: Instant) -> Result<Self> {
        config.validate()?;
        let surface = config.surface.clone();
        let centre = surface.origin_mm + Vector2::new(surface.width_mm, surface.height_mm) / 2.0;
        Ok(Self {
            lens: config.lens.clone().map(LensCorrector::new),
            locator: SurfaceLocator::new(config.marker.clone()),
            surface,
            ball: config.ball.clone(),
            wait_time: config.wait_time()?,
            last_position: centre,
            last_seen: now,
            reported_lost: false,
        })
    }

    /// Convert a pixel in the geometry-corrected image to surface millimetres.
    pub fn pixel_to_mm(&self, (px, py): (f64, f64)) -> Vector2 {
        self.surface.origin_mm + Vector2::new(px, py) / self.surface.pixels_per_mm
    }

    /// Run the vision pipeline on one frame without touching the loss state.
    pub fn measure(&mut self, frame: &RgbImage) -> (Option<Vector2>, SurfaceFix) {
        let undistorted;
        let frame = match &self.lens {
            Some(lens) => {
                undistorted = lens.undistort(frame);
                &undistorted
            }
            None => frame,
        };

        let (quad, fix) = self.locator.locate(frame);
        let Some(quad) = quad else {
            return (None, fix);
        };
        let Some(corrected) = rectify(frame, &quad, &self.surface) else {
            debug!(?quad, "degenerate surface quadrilateral");
            return (None, fix);
        };

        let position = locate_ball(&corrected, &self.ball).map(|candidate| {
            debug!(area = candidate.area, radius = candidate.radius, "ball candidate");
            self.pixel_to_mm(candidate.centre)
        });
        (position, fix)
    }

    pub fn update(&mut self, now: Instant, frame: &RgbImage) -> BallReading {
        let (position, surface) = self.measure(frame);

        if let Some(position) = position {
            if self.reported_lost {
                info!(%position, "ball reacquired");
            }
            self.last_position = position;
            self.last_seen = now;
            self.reported_lost = false;
            return BallReading {
                active: true,
                position,
                detected: true,
                surface,
            };
        }

        let missing_for = now.saturating_duration_since(self.last_seen);
        let active = missing_for < self.wait_time;
        if !active && !self.reported_lost {
            info!(?missing_for, last = %self.last_position, "ball lost");
            self.reported_lost = true;
        }
        BallReading {
            active,
            position: self.last_position,
            detected: false,
            surface,
        }
    }

    pub fn last_position(&self) -> Vector2 {
        self.last_position
    }

    pub fn surface_config(&self) -> &SurfaceConfig {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn pixel_scale_and_origin_are_applied() {
        let estimator = PositionEstimator::new(&VisionConfig::default(), Instant::now()).unwrap();
        let mm = estimator.pixel_to_mm((100.0, 50.0));
        assert_eq!(mm, Vector2::new(28.75 + 50.0, 28.25 + 25.0));
    }

    #[test]
    fn negative_wait_time_is_rejected() {
        let mut config = VisionConfig::default();
        config.wait_time_s = -1.0;
        let result = PositionEstimator::new(&config, Instant::now());
        assert!(matches!(result, Err(crate::LabyrinthError::InvalidConfig(_))));
    }

    #[test]
    fn blank_frames_expire_after_wait_time() {
        let start = Instant::now();
        let mut estimator = PositionEstimator::new(&VisionConfig::default(), start).unwrap();
        let blank = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));

        let early = estimator.update(start + Duration::from_millis(100), &blank);
        assert!(early.active);
        assert!(!early.detected);
        assert_eq!(early.surface, SurfaceFix::Missing);

        let late = estimator.update(start + Duration::from_millis(600), &blank);
        assert!(!late.active);
    }
}
