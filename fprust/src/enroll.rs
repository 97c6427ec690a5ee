//! Two-capture enrollment

use tracing::{debug, info, warn};

use fprust_core::constants::{CHAR_BUFFER_1, CHAR_BUFFER_2};
use fprust_core::ConfirmationCode;
use fprust_types::{EnrollStage, FailureReason, SensorEvent};

use crate::error::Error;
use crate::sensor::Sensor;
use crate::workflow::{EventSink, Progress};

/// Enrollment of one finger into one library slot
///
/// Each [`step`](Self::step) issues exactly one command. The finger is
/// captured twice, with a lift in between, and the merged template is
/// stored in the target slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollMachine {
    slot: u16,
    stage: EnrollStage,
    retries: u8,
    max_retries: u8,
}

impl EnrollMachine {
    /// Begin enrolling into `slot`, emitting `EnrollStarted`
    pub fn start<S: EventSink + ?Sized>(slot: u16, max_retries: u8, sink: &mut S) -> Self {
        info!(slot, "Enrollment started");
        sink.emit(SensorEvent::EnrollStarted { slot });

        Self {
            slot,
            stage: EnrollStage::WaitFinger1,
            retries: 0,
            max_retries,
        }
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub fn stage(&self) -> EnrollStage {
        self.stage
    }

    /// Failures counted in the current stage group
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Advance by one command
    pub async fn step<S: EventSink + ?Sized>(&mut self, sensor: &mut Sensor, sink: &mut S) -> Progress {
        match self.stage {
            EnrollStage::WaitFinger1 => self.wait_finger(sensor, sink, EnrollStage::GenChar1).await,
            EnrollStage::WaitFinger2 => self.wait_finger(sensor, sink, EnrollStage::GenChar2).await,
            EnrollStage::GenChar1 => match sensor.gen_char(CHAR_BUFFER_1).await {
                Ok(()) => self.captured(1, EnrollStage::WaitFingerRemoved, sink),
                Err(e) => self.retry(e, EnrollStage::WaitFinger1, sink),
            },
            EnrollStage::GenChar2 => match sensor.gen_char(CHAR_BUFFER_2).await {
                Ok(()) => self.captured(2, EnrollStage::CreateModel, sink),
                Err(e) => self.retry(e, EnrollStage::WaitFinger2, sink),
            },
            EnrollStage::WaitFingerRemoved => match sensor.capture_image().await {
                Ok(false) => {
                    sink.emit(SensorEvent::FingerRemoved);
                    self.advance(EnrollStage::WaitFinger2);
                    Progress::Waiting
                }
                Ok(true) => {
                    self.retries = 0;
                    Progress::Waiting
                }
                Err(e) => self.retry(e, EnrollStage::WaitFingerRemoved, sink),
            },
            EnrollStage::CreateModel => match sensor.reg_model().await {
                Ok(()) => {
                    self.advance(EnrollStage::StoreModel);
                    Progress::Advanced
                }
                Err(Error::Sensor {
                    confirmation: ConfirmationCode::CombineFail,
                    ..
                }) => self.fail(FailureReason::Mismatch, sink),
                Err(e) => self.fail(e.failure_reason(), sink),
            },
            EnrollStage::StoreModel => match sensor.store(CHAR_BUFFER_1, self.slot).await {
                Ok(()) => {
                    info!(slot = self.slot, "Enrollment complete");
                    sink.emit(SensorEvent::EnrollComplete { slot: self.slot });
                    Progress::Finished
                }
                Err(e) => self.fail(e.failure_reason(), sink),
            },
        }
    }

    /// Abandon the enrollment, emitting `EnrollCancelled`
    ///
    /// Character buffers keep whatever the sensor last wrote to them.
    pub fn cancel<S: EventSink + ?Sized>(self, sink: &mut S) {
        info!(slot = self.slot, stage = ?self.stage, "Enrollment cancelled");
        sink.emit(SensorEvent::EnrollCancelled { slot: self.slot });
    }

    async fn wait_finger<S: EventSink + ?Sized>(
        &mut self,
        sensor: &mut Sensor,
        sink: &mut S,
        next: EnrollStage,
    ) -> Progress {
        match sensor.capture_image().await {
            Ok(true) => {
                sink.emit(SensorEvent::FingerDetected);
                self.advance(next);
                Progress::Advanced
            }
            Ok(false) => {
                // Only back-to-back failures count against the budget
                self.retries = 0;
                Progress::Waiting
            }
            Err(e) => {
                let stage = self.stage;
                self.retry(e, stage, sink)
            }
        }
    }

    fn captured<S: EventSink + ?Sized>(&mut self, step: u8, next: EnrollStage, sink: &mut S) -> Progress {
        sink.emit(SensorEvent::EnrollStep { step });
        self.retries = 0;
        self.advance(next);
        Progress::Advanced
    }

    fn advance(&mut self, next: EnrollStage) {
        debug!(slot = self.slot, from = ?self.stage, to = ?next, "Enroll stage");
        self.stage = next;
    }

    fn retry<S: EventSink + ?Sized>(&mut self, error: Error, back_to: EnrollStage, sink: &mut S) -> Progress {
        self.retries = self.retries.saturating_add(1);

        if self.retries >= self.max_retries {
            let stage = self.stage.into();
            return self.fail(FailureReason::RetriesExhausted { stage }, sink);
        }

        warn!(
            slot = self.slot,
            stage = ?self.stage,
            retry = self.retries,
            error = %error,
            "Enroll step failed"
        );
        self.stage = back_to;
        Progress::Waiting
    }

    fn fail<S: EventSink + ?Sized>(&self, reason: FailureReason, sink: &mut S) -> Progress {
        warn!(slot = self.slot, stage = ?self.stage, %reason, "Enrollment failed");
        sink.emit(SensorEvent::EnrollFailed {
            slot: self.slot,
            reason,
        });
        Progress::Finished
    }

    #[cfg(test)]
    fn at(slot: u16, stage: EnrollStage) -> Self {
        Self {
            slot,
            stage,
            retries: 0,
            max_retries: 3,
        }
    }
}
