//! Identification cycle

use tracing::{debug, info, warn};

use fprust_core::constants::CHAR_BUFFER_1;
use fprust_types::{FailureReason, SearchStage, SensorEvent};

use crate::error::Error;
use crate::sensor::Sensor;
use crate::workflow::{EventSink, Progress};

/// What the cycle does after the finger is lifted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// Identify one finger, then end
    #[default]
    Once,
    /// Keep scanning until cancelled
    Continuous,
}

/// Capture, extract, and search the library for one finger at a time
///
/// Every outcome is followed by a wait for the finger to be lifted so a
/// single placement produces a single outcome event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCycle {
    mode: SearchMode,
    stage: SearchStage,
    retries: u8,
    max_retries: u8,
    idle_polls: u32,
}

impl SearchCycle {
    pub fn new(mode: SearchMode, max_retries: u8) -> Self {
        info!(?mode, "Search started");
        Self {
            mode,
            stage: SearchStage::WaitFinger,
            retries: 0,
            max_retries,
            idle_polls: 0,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn stage(&self) -> SearchStage {
        self.stage
    }

    /// Consecutive polls that found no finger
    pub fn idle_polls(&self) -> u32 {
        self.idle_polls
    }

    /// Advance by one command
    pub async fn step<S: EventSink + ?Sized>(&mut self, sensor: &mut Sensor, sink: &mut S) -> Progress {
        match self.stage {
            SearchStage::WaitFinger => match sensor.capture_image().await {
                Ok(true) => {
                    self.idle_polls = 0;
                    sink.emit(SensorEvent::FingerDetected);
                    self.advance(SearchStage::GenChar);
                    Progress::Advanced
                }
                Ok(false) => {
                    // Only back-to-back failures count against the budget
                    self.retries = 0;
                    self.idle_polls = self.idle_polls.saturating_add(1);
                    Progress::Waiting
                }
                Err(e) => self.retry(e, SearchStage::WaitFinger, sink),
            },
            SearchStage::GenChar => match sensor.gen_char(CHAR_BUFFER_1).await {
                Ok(()) => {
                    self.retries = 0;
                    self.advance(SearchStage::Search);
                    Progress::Advanced
                }
                Err(e) => self.retry(e, SearchStage::WaitFinger, sink),
            },
            SearchStage::Search => {
                let event = match sensor.search_library().await {
                    Ok(Some(hit)) => {
                        info!(slot = hit.slot, score = hit.score, "Match found");
                        SensorEvent::MatchFound {
                            slot: hit.slot,
                            score: hit.score,
                        }
                    }
                    Ok(None) => {
                        info!("No match");
                        SensorEvent::MatchNotFound
                    }
                    Err(e) => {
                        warn!(error = %e, "Search failed");
                        SensorEvent::Error {
                            reason: e.failure_reason(),
                        }
                    }
                };
                sink.emit(event);
                self.retries = 0;
                self.advance(SearchStage::WaitFingerRemoved);
                Progress::Advanced
            }
            SearchStage::WaitFingerRemoved => match sensor.capture_image().await {
                Ok(false) => {
                    sink.emit(SensorEvent::FingerRemoved);
                    match self.mode {
                        SearchMode::Once => Progress::Finished,
                        SearchMode::Continuous => {
                            self.retries = 0;
                            self.advance(SearchStage::WaitFinger);
                            Progress::Waiting
                        }
                    }
                }
                Ok(true) => {
                    self.retries = 0;
                    Progress::Waiting
                }
                Err(e) => self.retry(e, SearchStage::WaitFingerRemoved, sink),
            },
        }
    }

    /// Stop the cycle, emitting `SearchCancelled`
    pub fn cancel<S: EventSink + ?Sized>(self, sink: &mut S) {
        info!(stage = ?self.stage, "Search cancelled");
        sink.emit(SensorEvent::SearchCancelled);
    }

    fn advance(&mut self, next: SearchStage) {
        debug!(from = ?self.stage, to = ?next, "Search stage");
        self.stage = next;
    }

    fn retry<S: EventSink + ?Sized>(&mut self, error: Error, back_to: SearchStage, sink: &mut S) -> Progress {
        self.retries = self.retries.saturating_add(1);

        if self.retries >= self.max_retries {
            let reason = FailureReason::RetriesExhausted {
                stage: self.stage.into(),
            };
            warn!(stage = ?self.stage, %reason, "Search aborted");
            sink.emit(SensorEvent::Error { reason });
            return Progress::Finished;
        }

        warn!(stage = ?self.stage, retry = self.retries, error = %error, "Search step failed");
        self.stage = back_to;
        Progress::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSensor;
    use crate::SensorConfig;
    use fprust_core::{ConfirmationCode, Opcode};
    use fprust_transport::MockHandle;
    use fprust_types::{Stage, TransportFailure};
    use pretty_assertions::assert_eq;

    async fn sensor(fake: FakeSensor) -> (Sensor, MockHandle) {
        let channel = fake.into_channel();
        let handle = channel.handle();
        let mut sensor = Sensor::new(Box::new(channel), &SensorConfig::default());
        sensor.open().await.unwrap();
        (sensor, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_then_removal() {
        let (mut sensor, _) = sensor(
            FakeSensor::new()
                .reply(Opcode::GetImage, ConfirmationCode::Ok)
                .reply(Opcode::GetImage, ConfirmationCode::Ok)
                .reply(Opcode::GetImage, ConfirmationCode::NoFinger)
                .reply(Opcode::GenChar, ConfirmationCode::Ok)
                .reply_with(Opcode::Search, ConfirmationCode::Ok, &[0x00, 0x07, 0x00, 0x64]),
        )
        .await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle::new(SearchMode::Once, 3);

        let mut steps = Vec::new();
        for _ in 0..5 {
            steps.push(cycle.step(&mut sensor, &mut events).await);
        }

        assert_eq!(
            steps,
            vec![
                Progress::Advanced,
                Progress::Advanced,
                Progress::Advanced,
                Progress::Waiting,
                Progress::Finished,
            ]
        );
        assert_eq!(
            events,
            vec![
                SensorEvent::FingerDetected,
                SensorEvent::MatchFound { slot: 7, score: 100 },
                SensorEvent::FingerRemoved,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found() {
        let (mut sensor, _) = sensor(
            FakeSensor::new()
                .reply(Opcode::GenChar, ConfirmationCode::Ok)
                .reply(Opcode::Search, ConfirmationCode::NotFound),
        )
        .await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle {
            stage: SearchStage::GenChar,
            ..SearchCycle::new(SearchMode::Once, 3)
        };

        cycle.step(&mut sensor, &mut events).await;
        cycle.step(&mut sensor, &mut events).await;

        assert_eq!(events, vec![SensorEvent::MatchNotFound]);
        assert_eq!(cycle.stage(), SearchStage::WaitFingerRemoved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_transport_failure_is_error_event() {
        // No Search reply at all: every attempt times out
        let (mut sensor, handle) = sensor(FakeSensor::new()).await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle {
            stage: SearchStage::Search,
            ..SearchCycle::new(SearchMode::Once, 3)
        };

        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Advanced);
        assert_eq!(
            events,
            vec![SensorEvent::Error {
                reason: FailureReason::Transport(TransportFailure::Timeout),
            }]
        );
        // One attempt plus the default two transport retries
        assert_eq!(handle.write_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_finger_emits_nothing() {
        let (mut sensor, handle) =
            sensor(FakeSensor::new().always(Opcode::GetImage, ConfirmationCode::NoFinger)).await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle::new(SearchMode::Once, 3);

        for _ in 0..20 {
            assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Waiting);
        }

        assert!(events.is_empty());
        assert_eq!(cycle.idle_polls(), 20);
        assert_eq!(handle.write_count(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_restarts() {
        let (mut sensor, _) = sensor(
            FakeSensor::new()
                .reply(Opcode::GetImage, ConfirmationCode::NoFinger)
                .reply(Opcode::GetImage, ConfirmationCode::Ok),
        )
        .await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle {
            stage: SearchStage::WaitFingerRemoved,
            ..SearchCycle::new(SearchMode::Continuous, 3)
        };

        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Waiting);
        assert_eq!(cycle.stage(), SearchStage::WaitFinger);
        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Advanced);

        assert_eq!(
            events,
            vec![SensorEvent::FingerRemoved, SensorEvent::FingerDetected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gen_char_failures_exhaust_retries() {
        let (mut sensor, _) = sensor(
            FakeSensor::new()
                .always(Opcode::GetImage, ConfirmationCode::Ok)
                .always(Opcode::GenChar, ConfirmationCode::ImageTooSmall),
        )
        .await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle::new(SearchMode::Continuous, 2);

        let mut last = Progress::Waiting;
        for _ in 0..4 {
            last = cycle.step(&mut sensor, &mut events).await;
        }

        assert_eq!(last, Progress::Finished);
        assert_eq!(
            events,
            vec![
                SensorEvent::FingerDetected,
                SensorEvent::FingerDetected,
                SensorEvent::Error {
                    reason: FailureReason::RetriesExhausted {
                        stage: Stage::Search(SearchStage::GenChar),
                    },
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sporadic_capture_errors_keep_scanning() {
        // Idle polls between failures: each failure starts a fresh count
        let mut fake = FakeSensor::new().always(Opcode::GetImage, ConfirmationCode::NoFinger);
        for _ in 0..5 {
            fake = fake
                .reply_times(Opcode::GetImage, ConfirmationCode::NoFinger, 50)
                .reply(Opcode::GetImage, ConfirmationCode::ImageCaptureFailed);
        }
        let (mut sensor, _) = sensor(fake).await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle::new(SearchMode::Continuous, 2);

        for _ in 0..300 {
            assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Waiting);
        }

        assert!(events.is_empty());
        assert_eq!(cycle.stage(), SearchStage::WaitFinger);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_capture_errors_exhaust_retries() {
        let (mut sensor, _) = sensor(
            FakeSensor::new()
                .reply(Opcode::GetImage, ConfirmationCode::NoFinger)
                .always(Opcode::GetImage, ConfirmationCode::ImageCaptureFailed),
        )
        .await;

        let mut events = Vec::new();
        let mut cycle = SearchCycle::new(SearchMode::Continuous, 2);

        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Waiting);
        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Waiting);
        assert_eq!(cycle.step(&mut sensor, &mut events).await, Progress::Finished);
        assert_eq!(
            events,
            vec![SensorEvent::Error {
                reason: FailureReason::RetriesExhausted {
                    stage: Stage::Search(SearchStage::WaitFinger),
                },
            }]
        );
    }

    #[test]
    fn test_cancel() {
        let mut events = Vec::new();
        SearchCycle::new(SearchMode::Continuous, 3).cancel(&mut events);
        assert_eq!(events, vec![SensorEvent::SearchCancelled]);
    }
}
