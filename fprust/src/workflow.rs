//! Shared plumbing for the enrollment and identification workflows

use fprust_types::SensorEvent;

/// Receiver of workflow events
#[cfg_attr(test, mockall::automock)]
pub trait EventSink {
    fn emit(&mut self, event: SensorEvent);
}

impl EventSink for Vec<SensorEvent> {
    fn emit(&mut self, event: SensorEvent) {
        self.push(event);
    }
}

/// Outcome of a single workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing changed on the sensor side; poll again after a pause
    Waiting,
    /// Moved to the next stage; step again right away
    Advanced,
    /// The workflow reached a terminal state
    Finished,
}
