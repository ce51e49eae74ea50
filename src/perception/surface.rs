//! Playing-surface localisation with one-step hysteresis

use image::{Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use tracing::{debug, warn};

use super::segmentation::hsv_mask;
use crate::config::{MarkerConfig, SurfaceConfig};

/// Surface corners in frame pixels, clockwise from the top-left.
pub type Quad = [(f32, f32); 4];

/// How the geometry used for this tick was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFix {
    /// The quadrilateral was detected in this frame.
    Fresh,
    /// Detection failed; the last good quadrilateral was reused.
    Stale { consecutive_misses: u32 },
    /// No quadrilateral has ever been available.
    Missing,
}

impl SurfaceFix {
    pub fn is_fresh(&self) -> bool {
        matches!(self, SurfaceFix::Fresh)
    }
}

/// Simplify a closed contour. The curve is cut at two mutually distant
/// points, which on a convex outline are both hull vertices, so neither cut
/// can land mid-edge and survive as a spurious corner.
pub fn simplify_closed(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let farthest_from = |origin: Point<i32>| {
        points
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| {
                let dx = (p.x - origin.x) as i64;
                let dy = (p.y - origin.y) as i64;
                dx * dx + dy * dy
            })
            .map_or(0, |(i, _)| i)
    };
    let a = farthest_from(points[0]);
    let b = farthest_from(points[a]);
    if a == b {
        return vec![points[a]];
    }

    let rotated: Vec<Point<i32>> = (0..n).map(|k| points[(a + k) % n]).collect();
    let split = (b + n - a) % n;
    let mut first = approximate_polygon_dp(&rotated[..=split], epsilon, false);
    let mut tail: Vec<Point<i32>> = rotated[split..].to_vec();
    tail.push(rotated[0]);
    let mut second = approximate_polygon_dp(&tail, epsilon, false);

    first.pop();
    second.pop();
    first.append(&mut second);
    first
}

/// Contour points are pixel centres, half a pixel inside the region's
/// boundary. Push each corner outward so the quad spans whole pixels.
fn expand_to_pixel_edges(quad: Quad) -> Quad {
    let cx = quad.iter().map(|p| p.0).sum::<f32>() / 4.0;
    let cy = quad.iter().map(|p| p.1).sum::<f32>() / 4.0;
    let half = |d: f32| {
        if d > 0.0 {
            0.5
        } else if d < 0.0 {
            -0.5
        } else {
            0.0
        }
    };
    quad.map(|(x, y)| (x + half(x - cx), y + half(y - cy)))
}

/// Order four corners clockwise from the top-left in image coordinates
/// (y grows downward). Returns `None` when the corners are not distinct.
pub fn order_corners(corners: &[Point<i32>]) -> Option<Quad> {
    if corners.len() != 4 {
        return None;
    }
    let sum = |p: &&Point<i32>| p.x + p.y;
    let diff = |p: &&Point<i32>| p.y - p.x;

    let tl = corners.iter().min_by_key(sum)?;
    let br = corners.iter().max_by_key(sum)?;
    let tr = corners.iter().min_by_key(diff)?;
    let bl = corners.iter().max_by_key(diff)?;

    let ordered = [tl, tr, br, bl];
    for i in 0..4 {
        for j in (i + 1)..4 {
            if ordered[i] == ordered[j] {
                return None;
            }
        }
    }
    Some(ordered.map(|p| (p.x as f32, p.y as f32)))
}

/// Find the marker-coloured quadrilateral in a frame.
pub fn detect_quad(frame: &RgbImage, marker: &MarkerConfig) -> Option<Quad> {
    let mask = hsv_mask(frame, &marker.hsv);
    let contours = find_contours::<i32>(&mask);

    let (points, perimeter) = contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .map(|c| (&c.points, arc_length(&c.points, true)))
        .filter(|(_, perimeter)| *perimeter >= marker.min_perimeter_px)
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let corners = simplify_closed(points, marker.approx_epsilon_fraction * perimeter);
    debug!(perimeter, corners = corners.len(), "marker contour");
    order_corners(&corners).map(expand_to_pixel_edges)
}

/// Tracks the playing-surface quadrilateral across frames.
#[derive(Debug, Clone)]
pub struct SurfaceLocator {
    marker: MarkerConfig,
    last: Option<Quad>,
    misses: u32,
}

impl SurfaceLocator {
    pub fn new(marker: MarkerConfig) -> Self {
        let last = marker.initial_corners.map(|c| c.map(|[x, y]| (x, y)));
        Self {
            marker,
            last,
            misses: 0,
        }
    }

    /// Detect the surface, falling back to the most recent good detection.
    pub fn locate(&mut self, frame: &RgbImage) -> (Option<Quad>, SurfaceFix) {
        if let Some(quad) = detect_quad(frame, &self.marker) {
            self.last = Some(quad);
            self.misses = 0;
            return (Some(quad), SurfaceFix::Fresh);
        }

        self.misses = self.misses.saturating_add(1);
        match self.last {
            Some(quad) => {
                if self.misses == 1 {
                    warn!("surface marker not found, reusing previous geometry");
                }
                (
                    Some(quad),
                    SurfaceFix::Stale {
                        consecutive_misses: self.misses,
                    },
                )
            }
            None => (None, SurfaceFix::Missing),
        }
    }
}

/// Target rectangle of the geometry-corrected image, in its own pixels.
pub fn surface_rect(surface: &SurfaceConfig) -> Quad {
    let (w, h) = surface.pixel_size();
    let (w, h) = (w as f32, h as f32);
    [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
}

/// Warp the quadrilateral onto the physical surface rectangle. Returns
/// `None` for degenerate corner sets.
pub fn rectify(frame: &RgbImage, quad: &Quad, surface: &SurfaceConfig) -> Option<RgbImage> {
    let projection = Projection::from_control_points(*quad, surface_rect(surface))?;
    let (w, h) = surface.pixel_size();
    let mut out = RgbImage::new(w, h);
    warp_into(frame, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}
