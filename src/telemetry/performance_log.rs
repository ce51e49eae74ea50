use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;

/// Bounded record of recent loop iterations. Clones share the same entries.
#[derive(Clone)]
pub struct PerformanceLog {
    entries: Arc<RwLock<VecDeque<String>>>,
    last_time: Arc<Mutex<Instant>>,
    max_size: usize,
}

impl PerformanceLog {
    pub fn new(max_size: usize, start: Instant) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(max_size))),
            last_time: Arc::new(Mutex::new(start)),
            max_size,
        }
    }

    /// Append one iteration's entry and return it.
    pub fn update(&self, control_on: bool, presentation_on: bool, now: Instant) -> String {
        let step = {
            let mut last = self.last_time.lock();
            let step = now.saturating_duration_since(*last);
            *last = now;
            step
        };
        let entry = format!(
            "control: {control_on}, presentation: {presentation_on}, step: {:.3}ms",
            step.as_secs_f64() * 1000.0
        );
        self.write(entry.clone());
        entry
    }

    pub fn write(&self, message: String) {
        let mut log = self.entries.write();
        log.push_back(message);
        while log.len() > self.max_size {
            log.pop_front();
        }
    }

    pub fn read_all(&self) -> Vec<String> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the retained entries to a text file, one per line.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = self.read_all().join("\n");
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn keeps_only_most_recent_entries() {
        let start = Instant::now();
        let log = PerformanceLog::new(30, start);
        for i in 0..45u64 {
            log.update(i % 2 == 0, false, start + Duration::from_millis(i * 10));
        }
        assert_eq!(log.len(), 30);
    }

    #[test]
    fn entry_reports_step_since_previous_update() {
        let start = Instant::now();
        let log = PerformanceLog::new(30, start);
        let entry = log.update(true, false, start + Duration::from_millis(25));
        assert_eq!(entry, "control: true, presentation: false, step: 25.000ms");
    }
}
