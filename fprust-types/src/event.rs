//! Workflow events and failure reasons

use std::fmt;

use chrono::{DateTime, Utc};

use fprust_core::ConfirmationCode;

/// Enrollment workflow stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollStage {
    WaitFinger1,
    GenChar1,
    WaitFingerRemoved,
    WaitFinger2,
    GenChar2,
    CreateModel,
    StoreModel,
}

/// Identification workflow stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStage {
    WaitFinger,
    GenChar,
    Search,
    WaitFingerRemoved,
}

/// Stage of either workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Enroll(EnrollStage),
    Search(SearchStage),
}

impl From<EnrollStage> for Stage {
    fn from(stage: EnrollStage) -> Self {
        Self::Enroll(stage)
    }
}

impl From<SearchStage> for Stage {
    fn from(stage: SearchStage) -> Self {
        Self::Search(stage)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enroll(stage) => write!(f, "enroll/{:?}", stage),
            Self::Search(stage) => write!(f, "search/{:?}", stage),
        }
    }
}

/// Transport failure class, detached from the error value so events stay `Copy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailure {
    /// No complete frame before the deadline
    Timeout,
    /// No frame header found in the byte stream
    NoSync,
    /// Frame structurally invalid
    Malformed,
    /// Frame checksum did not match
    Checksum,
    /// Channel closed or not open
    Closed,
    /// Underlying I/O error
    Io,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Timeout => "timeout",
            Self::NoSync => "no frame header",
            Self::Malformed => "malformed frame",
            Self::Checksum => "checksum mismatch",
            Self::Closed => "channel closed",
            Self::Io => "i/o error",
        };
        f.write_str(text)
    }
}

/// Why a workflow or library operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The two captures could not be combined into one template
    Mismatch,
    /// Slot rejected by the sensor
    BadLocation,
    /// A stage used up its retry budget
    RetriesExhausted { stage: Stage },
    /// Sensor answered with a failure confirmation
    Sensor(ConfirmationCode),
    /// Exchange with the sensor failed
    Transport(TransportFailure),
    /// Acknowledgement payload shorter than the command defines
    UnexpectedPayload { len: usize },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch => f.write_str("captures do not match"),
            Self::BadLocation => f.write_str("slot beyond library"),
            Self::RetriesExhausted { stage } => write!(f, "retries exhausted in {}", stage),
            Self::Sensor(code) => write!(f, "sensor error {}", code),
            Self::Transport(kind) => write!(f, "transport error: {}", kind),
            Self::UnexpectedPayload { len } => write!(f, "unexpected payload of {} bytes", len),
        }
    }
}

/// Slots addressed by a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteTarget {
    /// `count` slots starting at `start`
    Range { start: u16, count: u16 },
    /// Entire library
    All,
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { start, count: 1 } => write!(f, "slot {}", start),
            Self::Range { start, count } => {
                write!(f, "slots {}..{}", start, u32::from(*start) + u32::from(*count))
            }
            Self::All => f.write_str("all slots"),
        }
    }
}

/// Event published by the sensor engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    /// A finger was placed on the sensor
    FingerDetected,
    /// The finger was lifted
    FingerRemoved,
    /// Enrollment into `slot` began
    EnrollStarted { slot: u16 },
    /// Capture `step` (1 or 2) produced a character file
    EnrollStep { step: u8 },
    /// Template stored in `slot`
    EnrollComplete { slot: u16 },
    /// Enrollment into `slot` aborted
    EnrollFailed { slot: u16, reason: FailureReason },
    /// Enrollment into `slot` cancelled by request
    EnrollCancelled { slot: u16 },
    /// Finger identified
    MatchFound { slot: u16, score: u16 },
    /// Finger not in the library
    MatchNotFound,
    /// Identification cancelled by request
    SearchCancelled,
    /// Templates deleted
    DeleteOk { target: DeleteTarget },
    /// Delete refused or failed
    DeleteFailed { target: DeleteTarget, reason: FailureReason },
    /// Identification cycle hit an error
    Error { reason: FailureReason },
}

impl SensorEvent {
    /// Check if the event ends an enrollment
    pub fn ends_enrollment(&self) -> bool {
        matches!(
            self,
            Self::EnrollComplete { .. } | Self::EnrollFailed { .. } | Self::EnrollCancelled { .. }
        )
    }

    /// Check if the event is the outcome of one identification
    pub fn is_search_outcome(&self) -> bool {
        matches!(
            self,
            Self::MatchFound { .. } | Self::MatchNotFound | Self::Error { .. }
        )
    }
}

impl fmt::Display for SensorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FingerDetected => f.write_str("finger detected"),
            Self::FingerRemoved => f.write_str("finger removed"),
            Self::EnrollStarted { slot } => write!(f, "enrollment into slot {} started", slot),
            Self::EnrollStep { step } => write!(f, "enrollment capture {} done", step),
            Self::EnrollComplete { slot } => write!(f, "template stored in slot {}", slot),
            Self::EnrollFailed { slot, reason } => {
                write!(f, "enrollment into slot {} failed: {}", slot, reason)
            }
            Self::EnrollCancelled { slot } => write!(f, "enrollment into slot {} cancelled", slot),
            Self::MatchFound { slot, score } => write!(f, "match in slot {} (score {})", slot, score),
            Self::MatchNotFound => f.write_str("no match"),
            Self::SearchCancelled => f.write_str("search cancelled"),
            Self::DeleteOk { target } => write!(f, "deleted {}", target),
            Self::DeleteFailed { target, reason } => {
                write!(f, "deleting {} failed: {}", target, reason)
            }
            Self::Error { reason } => write!(f, "error: {}", reason),
        }
    }
}

/// Event with sequence number and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Monotonic per-engine sequence number, starting at 1
    pub seq: u64,

    /// When the worker published the event
    pub at: DateTime<Utc>,

    /// The event
    pub event: SensorEvent,
}

impl EventRecord {
    pub fn new(seq: u64, event: SensorEvent) -> Self {
        Self {
            seq,
            at: Utc::now(),
            event,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}",
            self.seq,
            self.at.format("%H:%M:%S%.3f"),
            self.event
        )
    }
}
