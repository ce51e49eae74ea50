use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_with, Interpolation};

use crate::config::LensCalibration;

/// Radial and tangential lens correction with fixed per-camera coefficients.
#[derive(Debug, Clone)]
pub struct LensCorrector {
    lens: LensCalibration,
}

impl LensCorrector {
    pub fn new(lens: LensCalibration) -> Self {
        Self { lens }
    }

    /// Where an ideal (undistorted) pixel lands in the raw frame.
    pub fn distort_point(&self, u: f64, v: f64) -> (f64, f64) {
        let l = &self.lens;
        let x = (u - l.cx) / l.fx;
        let y = (v - l.cy) / l.fy;
        let r2 = x * x + y * y;
        let radial = 1.0 + l.k1 * r2 + l.k2 * r2 * r2 + l.k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * l.p1 * x * y + l.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + l.p1 * (r2 + 2.0 * y * y) + 2.0 * l.p2 * x * y;
        (l.fx * xd + l.cx, l.fy * yd + l.cy)
    }

    /// Remap the raw frame onto the ideal pinhole image of the same size.
    pub fn undistort(&self, frame: &RgbImage) -> RgbImage {
        warp_with(
            frame,
            |u, v| {
                let (x, y) = self.distort_point(u as f64, v as f64);
                (x as f32, y as f32)
            },
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens(k1: f64) -> LensCalibration {
        LensCalibration {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            k1,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        }
    }

    #[test]
    fn zero_coefficients_are_identity() {
        let corrector = LensCorrector::new(lens(0.0));
        let (x, y) = corrector.distort_point(100.0, 400.0);
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - 400.0).abs() < 1e-9);
    }

    #[test]
    fn principal_point_is_fixed_under_barrel_distortion() {
        let corrector = LensCorrector::new(lens(-0.2));
        let (x, y) = corrector.distort_point(320.0, 240.0);
        assert!((x - 320.0).abs() < 1e-9);
        assert!((y - 240.0).abs() < 1e-9);
        // Barrel distortion pulls outer points toward the centre.
        let (x, _) = corrector.distort_point(620.0, 240.0);
        assert!(x < 620.0);
    }
}
