//! Synthetic camera - renders a marker-framed board with a ball for offline runs

use std::collections::VecDeque;

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::Projection;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SurfaceConfig;
use crate::error::{LabyrinthError, Result};
use crate::interfaces::FrameSource;
use crate::maze::Maze;
use crate::perception::Quad;
use crate::vector::Vector2;

const BACKGROUND: [u8; 3] = [50, 50, 50];
const MARKER: [u8; 3] = [40, 170, 60];
const BOARD: [u8; 3] = [200, 200, 200];
const BALL: [u8; 3] = [30, 60, 200];

/// Board corners of a camera looking straight down.
pub const SQUARE_QUAD: Quad = [(60.0, 30.0), (580.0, 30.0), (580.0, 450.0), (60.0, 450.0)];

/// Board corners of a camera mounted slightly off axis.
pub const SKEWED_QUAD: Quad = [(72.0, 42.0), (566.0, 24.0), (592.0, 456.0), (50.0, 438.0)];

// ============================================================================
// SYNTHETIC CAMERA - Deterministic frames with seeded pixel noise
// ============================================================================

pub struct SyntheticCamera {
    rng: StdRng,
    surface: SurfaceConfig,
    width: u32,
    height: u32,
    quad: Quad,
    frame_to_surface: Projection,
    ball: Option<Vector2>,
    path: VecDeque<Vector2>,
    pub ball_radius_mm: f64,
    /// Width of the marker band around the board edge (mm).
    pub marker_band_mm: f64,
    /// Per-channel uniform noise amplitude.
    pub noise_amplitude: i16,
    occluded: bool,
    marker_visible: bool,
    fail_next: bool,
    frames_rendered: u64,
}

impl SyntheticCamera {
    pub fn new(surface: SurfaceConfig, seed: u64) -> Result<Self> {
        Self::with_quad(surface, SQUARE_QUAD, seed)
    }

    pub fn with_quad(surface: SurfaceConfig, quad: Quad, seed: u64) -> Result<Self> {
        let frame_to_surface = Self::projection(&surface, &quad)?;
        let centre = surface.origin_mm + Vector2::new(surface.width_mm, surface.height_mm) / 2.0;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            surface,
            width: 640,
            height: 480,
            quad,
            frame_to_surface,
            ball: Some(centre),
            path: VecDeque::new(),
            ball_radius_mm: 6.0,
            marker_band_mm: 8.0,
            noise_amplitude: 8,
            occluded: false,
            marker_visible: true,
            fail_next: false,
            frames_rendered: 0,
        })
    }

    fn projection(surface: &SurfaceConfig, quad: &Quad) -> Result<Projection> {
        let (w, h) = surface.pixel_size();
        let rect = [(0.0, 0.0), (w as f32, 0.0), (w as f32, h as f32), (0.0, h as f32)];
        Projection::from_control_points(*quad, rect)
            .ok_or_else(|| LabyrinthError::InvalidConfig("degenerate board quadrilateral".into()))
    }

    /// Move the board within the frame, as if the camera were bumped.
    pub fn set_quad(&mut self, quad: Quad) -> Result<()> {
        self.frame_to_surface = Self::projection(&self.surface, &quad)?;
        self.quad = quad;
        Ok(())
    }

    pub fn quad(&self) -> Quad {
        self.quad
    }

    /// Place the ball at a surface coordinate, or remove it.
    pub fn set_ball(&mut self, position: Option<Vector2>) {
        self.path.clear();
        self.ball = position;
    }

    pub fn ball(&self) -> Option<Vector2> {
        self.ball
    }

    /// Script the ball: each rendered frame consumes one position. The ball
    /// stays at the last one when the path runs out.
    pub fn follow_path(&mut self, path: impl IntoIterator<Item = Vector2>) {
        self.path = path.into_iter().collect();
    }

    pub fn path_remaining(&self) -> usize {
        self.path.len()
    }

    /// Hide the ball from view without forgetting where it is.
    pub fn set_occluded(&mut self, occluded: bool) {
        self.occluded = occluded;
    }

    /// Paint the marker band in board colour so the surface cannot be found.
    pub fn set_marker_visible(&mut self, visible: bool) {
        self.marker_visible = visible;
    }

    /// Make the next `next_frame` call fail, as an unplugged camera would.
    pub fn fail_next_frame(&mut self) {
        self.fail_next = true;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Draw one frame of the current scene.
    pub fn render(&mut self) -> RgbImage {
        let ppm = self.surface.pixels_per_mm;
        let (sw, sh) = self.surface.pixel_size();
        let (sw, sh) = (sw as f64, sh as f64);
        let band = self.marker_band_mm * ppm;
        let ball = match (self.ball, self.occluded) {
            (Some(b), false) => Some((b - self.surface.origin_mm) * ppm),
            _ => None,
        };
        let ball_r = self.ball_radius_mm * ppm;
        let projection = self.frame_to_surface;
        let marker = if self.marker_visible { MARKER } else { BOARD };

        let mut frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            let (u, v) = projection * (x as f32, y as f32);
            let (u, v) = (u as f64, v as f64);
            if !(u >= 0.0 && v >= 0.0 && u < sw && v < sh) {
                return Rgb(BACKGROUND);
            }
            if let Some(b) = ball {
                if (u - b.x).hypot(v - b.y) <= ball_r {
                    return Rgb(BALL);
                }
            }
            if u < band || v < band || u >= sw - band || v >= sh - band {
                Rgb(marker)
            } else {
                Rgb(BOARD)
            }
        });

        if self.noise_amplitude > 0 {
            let a = self.noise_amplitude;
            for pixel in frame.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    let noisy = *channel as i16 + self.rng.gen_range(-a..=a);
                    *channel = noisy.clamp(0, 255) as u8;
                }
            }
        }
        self.frames_rendered += 1;
        frame
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> Result<RgbImage> {
        if self.fail_next {
            self.fail_next = false;
            return Err(LabyrinthError::FrameSource("synthetic camera disconnected".into()));
        }
        if let Some(next) = self.path.pop_front() {
            self.ball = Some(next);
        }
        Ok(self.render())
    }
}

/// Scripted ball path through a maze: hold still at the start for
/// `hold_frames`, then glide to each checkpoint over `frames_per_leg` and
/// rest on it for `rest_frames`.
pub fn route_path(
    start: Vector2,
    maze: &Maze,
    hold_frames: usize,
    frames_per_leg: usize,
    rest_frames: usize,
) -> Vec<Vector2> {
    let mut path = vec![start; hold_frames];
    let mut from = start;
    for checkpoint in &maze.checkpoints {
        let to = checkpoint.position;
        for step in 1..=frames_per_leg {
            let t = step as f64 / frames_per_leg as f64;
            path.push(from + (to - from) * t);
        }
        path.extend(std::iter::repeat(to).take(rest_frames));
        from = to;
    }
    path
}
