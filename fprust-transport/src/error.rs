//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel not open")]
    NotOpen,

    #[error("Channel already open")]
    AlreadyOpen,

    #[error("Timeout opening channel")]
    OpenTimeout,

    #[error("Timeout waiting for response ({received} bytes received)")]
    Timeout { received: usize },

    #[error("No frame header found ({discarded} bytes discarded)")]
    NoSync { discarded: usize },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Check if a fresh exchange might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NoSync { .. } | Self::Io(_)
        )
    }

    /// Check if the channel has to be reopened
    pub fn requires_reopen(&self) -> bool {
        matches!(
            self,
            Self::NotOpen | Self::ConnectionClosed | Self::Serial(_)
        )
    }
}
