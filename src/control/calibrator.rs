use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::CalibrationConfig;
use crate::error::Result;
use crate::vector::Vector2;

#[derive(Debug, Clone, Copy)]
struct CalibrationSample {
    position: Vector2,
    tilt: Vector2,
    time: Instant,
}

/// Outcome of feeding one sample to the calibrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStatus {
    /// The ball has held still for the whole window.
    pub done: bool,
    /// Mean tilt command over the window. Holds the last good value while
    /// not done.
    pub level_offset: Vector2,
}

/// Learns the tilt command that keeps the ball still on a level platform.
pub struct Calibrator {
    window: Duration,
    tolerance_mm: f64,
    samples: VecDeque<CalibrationSample>,
    level_offset: Vector2,
    done: bool,
}

impl Calibrator {
    pub fn new(config: &CalibrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: config.window()?,
            tolerance_mm: config.tolerance_mm,
            samples: VecDeque::new(),
            level_offset: Vector2::ZERO,
            done: false,
        })
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.level_offset = Vector2::ZERO;
        self.done = false;
    }

    /// Span between the oldest buffered sample and `now`.
    fn span(&self, now: Instant) -> Duration {
        self.samples
            .front()
            .map_or(Duration::ZERO, |s| now.saturating_duration_since(s.time))
    }

    fn steady(&self) -> bool {
        let Some(first) = self.samples.front() else {
            return false;
        };
        self.samples.iter().all(|s| {
            (s.position.x - first.position.x).abs() <= self.tolerance_mm
                && (s.position.y - first.position.y).abs() <= self.tolerance_mm
        })
    }

    pub fn update(&mut self, position: Vector2, tilt: Vector2, now: Instant) -> CalibrationStatus {
        self.samples.push_back(CalibrationSample {
            position,
            tilt,
            time: now,
        });
        // Drop the oldest sample while the rest still cover the window.
        while self.samples.len() > 1
            && now.saturating_duration_since(self.samples[1].time) >= self.window
        {
            self.samples.pop_front();
        }

        let was_done = self.done;
        self.done = self.span(now) >= self.window && self.steady();

        if self.done {
            let sum = self
                .samples
                .iter()
                .fold(Vector2::ZERO, |acc, s| acc + s.tilt);
            self.level_offset = sum / self.samples.len() as f64;
            if !was_done {
                info!(level_offset = %self.level_offset, samples = self.samples.len(), "calibration steady");
            }
        } else if was_done {
            debug!(%position, "calibration revoked");
        }

        CalibrationStatus {
            done: self.done,
            level_offset: self.level_offset,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn level_offset(&self) -> Vector2 {
        self.level_offset
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
