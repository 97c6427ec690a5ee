//! Error types for fprust-core

/// Result type alias for fprust-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame is structurally invalid (short, bad header, wrong type or length)
    #[error("Malformed frame: {reason}")]
    MalformedFrame {
        reason: String,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown instruction code
    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Workflow bookkeeping rejected a transition
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Slot outside the template library
    #[error("Slot {slot} out of range (library holds {capacity} templates)")]
    SlotOutOfRange {
        slot: u16,
        capacity: u16,
    },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Whether the error came from bytes on the wire (the exchange may be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::ChecksumMismatch { .. }
        )
    }

    /// Whether the request was refused before any I/O
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidSessionState(_) | Self::SlotOutOfRange { .. }
        )
    }
}
