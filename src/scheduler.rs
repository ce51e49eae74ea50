//! Multi-rate loop gate - decides which activities run on the current tick

use std::time::{Duration, Instant};

use crate::config::TimingConfig;

/// Last firing time and period of one independently scheduled activity.
#[derive(Debug, Clone, Copy)]
pub struct TimingState {
    pub period: Duration,
    pub last_fired: Instant,
}

impl TimingState {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last_fired: start,
        }
    }

    /// Fire if strictly more than one period has passed. Returns the time
    /// since the previous firing when due.
    fn poll(&mut self, now: Instant) -> Option<Duration> {
        let since = now.saturating_duration_since(self.last_fired);
        if since > self.period {
            self.last_fired = now;
            Some(since)
        } else {
            None
        }
    }
}

/// Outcome of one scheduler poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleTick {
    pub control_due: bool,
    /// Time since the previous control firing. Only meaningful when
    /// `control_due` is set; otherwise it repeats the last firing's value.
    pub control_elapsed: Duration,
    pub presentation_due: bool,
}

/// Software timer division of one cooperative loop into a control rate and
/// a presentation rate. Never interrupts work in progress.
#[derive(Debug, Clone)]
pub struct Scheduler {
    control: TimingState,
    presentation: TimingState,
    control_elapsed: Duration,
}

impl Scheduler {
    pub fn new(config: &TimingConfig, start: Instant) -> Self {
        Self::with_periods(config.control_period(), config.presentation_period(), start)
    }

    pub fn with_periods(control: Duration, presentation: Duration, start: Instant) -> Self {
        Self {
            control: TimingState::new(control, start),
            presentation: TimingState::new(presentation, start),
            control_elapsed: Duration::ZERO,
        }
    }

    pub fn update(&mut self, now: Instant) -> ScheduleTick {
        let control = self.control.poll(now);
        if let Some(elapsed) = control {
            self.control_elapsed = elapsed;
        }
        let presentation = self.presentation.poll(now);

        ScheduleTick {
            control_due: control.is_some(),
            control_elapsed: self.control_elapsed,
            presentation_due: presentation.is_some(),
        }
    }

    pub fn control_period(&self) -> Duration {
        self.control.period
    }

    pub fn control_state(&self) -> TimingState {
        self.control
    }

    pub fn presentation_state(&self) -> TimingState {
        self.presentation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_due_at_start() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new(&TimingConfig::default(), start);
        let tick = scheduler.update(start);
        assert!(!tick.control_due);
        assert!(!tick.presentation_due);
        assert_eq!(tick.control_elapsed, Duration::ZERO);
    }

    #[test]
    fn firing_resets_to_poll_time() {
        let start = Instant::now();
        let mut scheduler =
            Scheduler::with_periods(Duration::from_millis(50), Duration::from_secs(1), start);
        let late = start + Duration::from_millis(120);
        assert!(scheduler.update(late).control_due);
        assert_eq!(scheduler.control_state().last_fired, late);
        // No catch-up firings for the missed period.
        assert!(!scheduler.update(late + Duration::from_millis(10)).control_due);
    }
}
