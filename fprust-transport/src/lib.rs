//! Transport layer for AS608 sensors
//!
//! Provides the byte channel abstraction, serial and TCP-bridge channels,
//! and the frame reader that turns a fragmented byte stream into
//! complete response frames.

pub mod error;
pub mod mock;
pub mod reader;
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
pub use mock::{MockChannel, MockHandle};
pub use reader::FrameReader;
pub use serial::SerialChannel;
pub use tcp::TcpChannel;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte channel to the sensor
///
/// Implementations own the underlying port. A single worker drives the
/// channel, so methods take `&mut self`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Open the channel
    async fn open(&mut self) -> Result<()>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;

    /// Check if open
    fn is_open(&self) -> bool;

    /// Write all bytes and wait until they are handed to the device
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Append whatever arrives within `timeout` to `buf`
    ///
    /// Returns the number of bytes appended; `0` means the timeout elapsed
    /// with nothing available.
    async fn read(&mut self, buf: &mut BytesMut, timeout: Duration) -> Result<usize>;

    /// Discard any bytes already received but not yet read
    async fn flush_input(&mut self) -> Result<()>;

    /// Human readable endpoint description
    fn describe(&self) -> String;
}
