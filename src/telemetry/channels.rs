use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::TickReport;

/// Operator requests delivered to a running control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Pause,
    Resume,
    Restart,
}

#[derive(Clone)]
pub struct TelemetryChannels {
    // Control loop -> observers
    pub report_tx: Sender<TickReport>,
    pub report_rx: Arc<Receiver<TickReport>>,

    // Operator -> control loop
    pub command_tx: Sender<LoopCommand>,
    pub command_rx: Arc<Receiver<LoopCommand>>,

    dropped: Arc<AtomicU64>,
}

impl TelemetryChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (report_tx, report_rx) = bounded(buffer_size);
        let (command_tx, command_rx) = bounded(buffer_size);

        Self {
            report_tx,
            report_rx: Arc::new(report_rx),
            command_tx,
            command_rx: Arc::new(command_rx),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a report to observers without blocking. A full channel drops the
    /// report and counts it.
    pub fn publish(&self, report: TickReport) -> bool {
        match self.report_tx.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Reports published so far that nobody has received yet.
    pub fn drain_reports(&self) -> Vec<TickReport> {
        self.report_rx.try_iter().collect()
    }

    pub fn send_command(&self, command: LoopCommand) -> bool {
        self.command_tx.try_send(command).is_ok()
    }

    pub fn dropped_reports(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
