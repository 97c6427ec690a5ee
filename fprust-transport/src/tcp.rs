//! TCP transport for serial-to-network bridges (ser2net and similar)

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Channel};

/// TCP channel to a bridge that forwards bytes to the sensor UART
pub struct TcpChannel {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
}

impl TcpChannel {
    /// Create new TCP channel
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(addr);
        Ok(addr)
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::OpenTimeout)??;

        // Frames are tiny; do not let Nagle hold them back
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.describe());
            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn read(&mut self, buf: &mut BytesMut, wait: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;

        let n = match timeout(wait, stream.read_buf(buf)).await {
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
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;
        let mut scratch = [0u8; 64];
        let mut dropped = 0;

        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => dropped += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        if dropped > 0 {
            debug!(dropped, "Discarded stale input");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("TCP channel dropped while still open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_channel_create() {
        let channel = TcpChannel::new("192.168.1.50", 2000);
        assert!(!channel.is_open());
        assert_eq!(channel.describe(), "192.168.1.50:2000");
    }

    #[tokio::test]
    async fn test_tcp_channel_invalid_address() {
        let mut channel =
            TcpChannel::new("invalid..address", 2000).with_connect_timeout(Duration::from_millis(100));

        let result = channel.open().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_channel_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();

        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&request).await.unwrap();
        });

        let mut channel = TcpChannel::new("127.0.0.1", local.port());
        channel.open().await.unwrap();
        assert!(matches!(channel.open().await, Err(Error::AlreadyOpen)));

        let frame = [0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x17, 0x00, 0x1B];
        channel.write(&frame).await.unwrap();

        let mut buf = BytesMut::new();
        while buf.len() < frame.len() {
            channel.read(&mut buf, Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(buf.as_ref(), &frame);

        bridge.await.unwrap();
        channel.close().await.unwrap();
        assert!(!channel.is_open());
    }
}
