//! High-level error types

use fprust_core::{ConfirmationCode, Opcode};
use fprust_types::{FailureReason, TransportFailure};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] fprust_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] fprust_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] fprust_types::Error),

    #[error("Sensor rejected {opcode}: {confirmation}")]
    Sensor {
        opcode: Opcode,
        confirmation: ConfirmationCode,
    },

    #[error("Slot {slot} is beyond the sensor library")]
    BadLocation { slot: u16 },

    #[error("Unexpected {len}-byte payload for {opcode}")]
    UnexpectedPayload { opcode: Opcode, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request queue full")]
    QueueFull,

    #[error("Sensor worker stopped")]
    WorkerStopped,
}

impl Error {
    /// Check if the exchange with the sensor itself failed
    ///
    /// Codec failures count: a frame that does not validate is treated the
    /// same as no frame at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_)) || matches!(self, Self::Core(e) if e.is_recoverable())
    }

    /// Check if the request was refused before any I/O
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_rejection()) || matches!(self, Self::InvalidConfig(_))
    }

    /// Confirmation code, if the sensor answered
    pub fn confirmation(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Sensor { confirmation, .. } => Some(*confirmation),
            Self::BadLocation { .. } => Some(ConfirmationCode::BadLocation),
            _ => None,
        }
    }

    /// Transport failure class, if this is a transport error
    pub fn transport_failure(&self) -> Option<TransportFailure> {
        use fprust_transport::Error as T;

        let kind = match self {
            Self::Transport(T::Timeout { .. } | T::OpenTimeout) => TransportFailure::Timeout,
            Self::Transport(T::NoSync { .. }) => TransportFailure::NoSync,
            Self::Transport(T::NotOpen | T::AlreadyOpen | T::ConnectionClosed) => {
                TransportFailure::Closed
            }
            Self::Transport(T::Io(_) | T::Serial(_) | T::InvalidAddress(_)) => TransportFailure::Io,
            Self::Core(fprust_core::Error::ChecksumMismatch { .. }) => TransportFailure::Checksum,
            Self::Core(fprust_core::Error::MalformedFrame { .. }) => TransportFailure::Malformed,
            _ => return None,
        };
        Some(kind)
    }

    /// Reason carried by failure events
    pub fn failure_reason(&self) -> FailureReason {
        if let Some(kind) = self.transport_failure() {
            return FailureReason::Transport(kind);
        }

        match self {
            Self::BadLocation { .. } => FailureReason::BadLocation,
            Self::Sensor { confirmation, .. } => FailureReason::Sensor(*confirmation),
            Self::UnexpectedPayload { len, .. } => FailureReason::UnexpectedPayload { len: *len },
            Self::Types(_) => FailureReason::UnexpectedPayload { len: 0 },
            _ => FailureReason::Sensor(ConfirmationCode::UndefinedError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codec_errors_are_transport() {
        let err = Error::from(fprust_core::Error::ChecksumMismatch {
            expected: 1,
            received: 2,
        });
        assert!(err.is_transport());
        assert_eq!(
            err.failure_reason(),
            FailureReason::Transport(TransportFailure::Checksum)
        );
    }

    #[test]
    fn test_timeout_is_transport() {
        let err = Error::from(fprust_transport::Error::Timeout { received: 3 });
        assert!(err.is_transport());
        assert!(!err.is_rejection());
        assert_eq!(err.transport_failure(), Some(TransportFailure::Timeout));
    }

    #[test]
    fn test_sensor_error() {
        let err = Error::Sensor {
            opcode: Opcode::RegModel,
            confirmation: ConfirmationCode::CombineFail,
        };
        assert!(!err.is_transport());
        assert_eq!(err.confirmation(), Some(ConfirmationCode::CombineFail));
        assert_eq!(
            err.failure_reason(),
            FailureReason::Sensor(ConfirmationCode::CombineFail)
        );
    }

    #[test]
    fn test_rejections() {
        let err = Error::from(fprust_core::Error::SlotOutOfRange {
            slot: 200,
            capacity: 162,
        });
        assert!(err.is_rejection());
        assert!(!err.is_transport());

        let err = Error::from(fprust_core::Error::InvalidSessionState("busy".into()));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_bad_location_distinct() {
        let err = Error::BadLocation { slot: 500 };
        assert!(!err.is_transport());
        assert_eq!(err.failure_reason(), FailureReason::BadLocation);
    }
}
