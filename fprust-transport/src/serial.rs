//! UART transport

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use fprust_core::constants::DEFAULT_BAUD_RATE;

use crate::{error::*, Channel};

/// Serial port channel (8N1)
pub struct SerialChannel {
    path: String,
    baud_rate: u32,
    port: Option<SerialStream>,
}

impl SerialChannel {
    /// Create a channel for `path` at the module's default 57600 baud
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Configured baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Channel for SerialChannel {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }

        debug!("Opening {} at {} baud...", self.path, self.baud_rate);

        let port = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .open_native_async()?;

        debug!("Opened {}", self.path);

        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            debug!("Closing {}...", self.path);
            let _ = port.shutdown().await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        port.write_all(data).await?;
        port.flush().await?;

        Ok(())
    }

    async fn read(&mut self, buf: &mut BytesMut, wait: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;

        let n = match timeout(wait, port.read_buf(buf)).await {
            Err(_) => return Ok(0),
            Ok(result) => result?,
        };

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes: {}", n, hex::encode(&buf[buf.len() - n..]));

        Ok(n)
    }

    async fn flush_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Serial channel dropped while still open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_channel_create() {
        let channel = SerialChannel::new("/dev/ttyUSB0");
        assert!(!channel.is_open());
        assert_eq!(channel.baud_rate(), 57_600);
        assert_eq!(channel.describe(), "/dev/ttyUSB0@57600");
    }

    #[tokio::test]
    async fn test_serial_channel_not_open() {
        let mut channel = SerialChannel::new("/dev/ttyUSB0").with_baud_rate(115_200);

        assert!(matches!(channel.write(&[0x00]).await, Err(Error::NotOpen)));
        assert!(matches!(channel.flush_input().await, Err(Error::NotOpen)));
    }

    #[tokio::test]
    async fn test_serial_channel_missing_port() {
        let mut channel = SerialChannel::new("/dev/does-not-exist-fprust");

        assert!(channel.open().await.is_err());
        assert!(!channel.is_open());
    }
}
