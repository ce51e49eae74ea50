//! Metrics module - Loop timing statistics

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LabyrinthError, Result};

fn histogram() -> Result<Arc<Mutex<Histogram<u64>>>> {
    let hist = Histogram::new(3).map_err(|e| LabyrinthError::Metrics(e.to_string()))?;
    Ok(Arc::new(Mutex::new(hist)))
}

fn q(hist: &Histogram<u64>, quantile: f64) -> Duration {
    Duration::from_nanos(hist.value_at_quantile(quantile))
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ============================================================================
// TIMING METRICS - Thread-safe loop timing
// ============================================================================

#[derive(Clone)]
pub struct TimingMetrics {
    perception_hist: Arc<Mutex<Histogram<u64>>>,
    control_hist: Arc<Mutex<Histogram<u64>>>,
    step_hist: Arc<Mutex<Histogram<u64>>>,
    // Deviation of each control step from the nominal period
    jitter_hist: Arc<Mutex<Histogram<u64>>>,
    control_period: Duration,
    control_ticks: Arc<AtomicU64>,
    missed_deadlines: Arc<AtomicU64>,
}

impl TimingMetrics {
    pub fn new(control_period: Duration) -> Result<Self> {
        Ok(Self {
            perception_hist: histogram()?,
            control_hist: histogram()?,
            step_hist: histogram()?,
            jitter_hist: histogram()?,
            control_period,
            control_ticks: Arc::new(AtomicU64::new(0)),
            missed_deadlines: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn record_perception(&self, duration: Duration) {
        self.perception_hist.lock().record(nanos(duration)).ok();
    }

    /// Record the work done on a control tick. Work longer than the control
    /// period counts as a missed deadline.
    pub fn record_control(&self, duration: Duration) {
        self.control_hist.lock().record(nanos(duration)).ok();
        self.control_ticks.fetch_add(1, Ordering::Relaxed);
        if duration > self.control_period {
            self.missed_deadlines.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the time between two control firings.
    pub fn record_step(&self, step: Duration) {
        self.step_hist.lock().record(nanos(step)).ok();
        let jitter = if step > self.control_period {
            step - self.control_period
        } else {
            self.control_period - step
        };
        self.jitter_hist.lock().record(nanos(jitter)).ok();
    }

    pub fn report(&self) -> MetricsReport {
        let perception = self.perception_hist.lock();
        let control = self.control_hist.lock();
        let step = self.step_hist.lock();
        let jitter = self.jitter_hist.lock();

        MetricsReport {
            perception_p50: q(&perception, 0.5),
            perception_p99: q(&perception, 0.99),
            control_p50: q(&control, 0.5),
            control_p99: q(&control, 0.99),
            step_p50: q(&step, 0.5),
            step_p99: q(&step, 0.99),
            jitter_p50: q(&jitter, 0.5),
            jitter_p99: q(&jitter, 0.99),
            control_period: self.control_period,
            control_ticks: self.control_ticks.load(Ordering::Relaxed),
            missed_deadlines: self.missed_deadlines.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// METRICS REPORT - Summary statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub perception_p50: Duration,
    pub perception_p99: Duration,
    pub control_p50: Duration,
    pub control_p99: Duration,
    pub step_p50: Duration,
    pub step_p99: Duration,
    pub jitter_p50: Duration,
    pub jitter_p99: Duration,
    pub control_period: Duration,
    pub control_ticks: u64,
    pub missed_deadlines: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlong_control_work_counts_as_miss() {
        let metrics = TimingMetrics::new(Duration::from_millis(50)).unwrap();
        metrics.record_control(Duration::from_millis(10));
        metrics.record_control(Duration::from_millis(80));
        let report = metrics.report();
        assert_eq!(report.control_ticks, 2);
        assert_eq!(report.missed_deadlines, 1);
    }

    #[test]
    fn jitter_is_distance_from_period() {
        let metrics = TimingMetrics::new(Duration::from_millis(50)).unwrap();
        for _ in 0..10 {
            metrics.record_step(Duration::from_millis(60));
        }
        let report = metrics.report();
        let jitter_ms = report.jitter_p50.as_secs_f64() * 1000.0;
        assert!((jitter_ms - 10.0).abs() < 0.1, "jitter {jitter_ms}");
    }
}
