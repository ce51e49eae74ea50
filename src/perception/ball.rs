use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::segmentation::{hsv_mask, open_mask};
use crate::config::BallDetectionConfig;

/// Best ball blob in a geometry-corrected image, in that image's pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallCandidate {
    pub centre: (f64, f64),
    pub radius: f64,
    pub area: f64,
}

/// Area enclosed by a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (twice as f64 / 2.0).abs()
}

#[derive(Debug, Clone, Copy)]
struct Circle {
    cx: f64,
    cy: f64,
    r: f64,
}

impl Circle {
    fn contains(&self, (x, y): (f64, f64)) -> bool {
        (x - self.cx).hypot(y - self.cy) <= self.r + 1e-7
    }

    fn from_two(a: (f64, f64), b: (f64, f64)) -> Self {
        let cx = (a.0 + b.0) / 2.0;
        let cy = (a.1 + b.1) / 2.0;
        Self {
            cx,
            cy,
            r: (a.0 - cx).hypot(a.1 - cy),
        }
    }

    fn from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < 1e-12 {
            // Collinear: the widest pair spans the circle.
            let candidates = [Self::from_two(a, b), Self::from_two(b, c), Self::from_two(a, c)];
            return candidates
                .into_iter()
                .max_by(|p, q| p.r.total_cmp(&q.r))
                .unwrap_or(Self::from_two(a, b));
        }
        let sq = |p: (f64, f64)| p.0 * p.0 + p.1 * p.1;
        let cx = (sq(a) * (b.1 - c.1) + sq(b) * (c.1 - a.1) + sq(c) * (a.1 - b.1)) / d;
        let cy = (sq(a) * (c.0 - b.0) + sq(b) * (a.0 - c.0) + sq(c) * (b.0 - a.0)) / d;
        Self {
            cx,
            cy,
            r: (a.0 - cx).hypot(a.1 - cy),
        }
    }
}

/// Fixed so repeated detections on the same frame agree exactly.
const SHUFFLE_SEED: u64 = 0x6c61_6279;

/// Smallest circle containing every point, as (centre, radius).
///
/// Points are visited in a seeded random order. Boundary order is the worst
/// case for the incremental construction.
pub fn min_enclosing_circle(points: &[(f64, f64)]) -> Option<((f64, f64), f64)> {
    let mut points = points.to_vec();
    points.shuffle(&mut StdRng::seed_from_u64(SHUFFLE_SEED));
    let (&first, rest) = points.split_first()?;
    let mut circle = Circle {
        cx: first.0,
        cy: first.1,
        r: 0.0,
    };
    for (i, &p) in rest.iter().enumerate() {
        if circle.contains(p) {
            continue;
        }
        let seen = &points[..=i];
        circle = Circle {
            cx: p.0,
            cy: p.1,
            r: 0.0,
        };
        for (j, &q) in seen.iter().enumerate() {
            if circle.contains(q) {
                continue;
            }
            circle = Circle::from_two(p, q);
            for &s in &seen[..j] {
                if !circle.contains(s) {
                    circle = Circle::from_three(p, q, s);
                }
            }
        }
    }
    Some(((circle.cx, circle.cy), circle.r))
}

/// Segment the ball colour, clean the mask and pick the largest external
/// blob above the area floor.
pub fn locate_ball(corrected: &RgbImage, config: &BallDetectionConfig) -> Option<BallCandidate> {
    let mask = open_mask(&hsv_mask(corrected, &config.hsv), config.morphology_radius);
    let contours = find_contours::<i32>(&mask);

    let (points, area) = contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| (&c.points, polygon_area(&c.points)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    if area <= config.min_area_px {
        return None;
    }

    let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let (centre, radius) = min_enclosing_circle(&coords)?;
    Some(BallCandidate {
        centre,
        radius,
        area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn enclosing_circle_of_square_corners() {
        let (centre, r) =
            min_enclosing_circle(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0), (1.0, 1.0)])
                .unwrap();
        assert!((centre.0 - 1.0).abs() < 1e-9 && (centre.1 - 1.0).abs() < 1e-9);
        assert!((r - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn enclosing_circle_of_single_point() {
        let (centre, r) = min_enclosing_circle(&[(3.0, 4.0)]).unwrap();
        assert_eq!(centre, (3.0, 4.0));
        assert_eq!(r, 0.0);
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn enclosing_circle_of_long_boundary_trace() {
        let n = 20_000;
        let boundary: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let theta = i as f64 * std::f64::consts::TAU / n as f64;
                (400.0 + 300.0 * theta.cos(), 250.0 + 300.0 * theta.sin())
            })
            .collect();
        let (centre, r) = min_enclosing_circle(&boundary).unwrap();
        assert!((centre.0 - 400.0).abs() < 1e-6 && (centre.1 - 250.0).abs() < 1e-6);
        assert!((r - 300.0).abs() < 1e-6);
        assert_eq!(min_enclosing_circle(&boundary), Some((centre, r)));
    }

    #[test]
    fn shoelace_area_of_rectangle() {
        let rect = [
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 3),
            Point::new(0, 3),
        ];
        assert_eq!(polygon_area(&rect), 12.0);
    }

    #[test]
    fn finds_blue_disc_on_grey_background() {
        let mut img = RgbImage::from_pixel(120, 100, Rgb([120, 120, 120]));
        for y in 0..100u32 {
            for x in 0..120u32 {
                let dx = x as f64 - 70.0;
                let dy = y as f64 - 40.0;
                if dx.hypot(dy) <= 10.0 {
                    img.put_pixel(x, y, Rgb([20, 40, 200]));
                }
            }
        }
        let found = locate_ball(&img, &BallDetectionConfig::default()).unwrap();
        assert!((found.centre.0 - 70.0).abs() < 1.0);
        assert!((found.centre.1 - 40.0).abs() < 1.0);
    }

    #[test]
    fn small_speck_is_ignored() {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([120, 120, 120]));
        for y in 10..13 {
            for x in 10..13 {
                img.put_pixel(x, y, Rgb([20, 40, 200]));
            }
        }
        assert!(locate_ball(&img, &BallDetectionConfig::default()).is_none());
    }
}
