//! Command round trips

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use fprust_core::{CommandPacket, ConfirmationCode, Opcode, Response};
use fprust_transport::{Channel, FrameReader};

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

/// Validated acknowledgement of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Confirmation code
    pub confirmation: ConfirmationCode,

    /// Bytes following the confirmation code
    pub payload: Bytes,
}

impl Reply {
    /// Turn any confirmation other than `Ok` into [`Error::Sensor`]
    pub fn ok_for(self, opcode: Opcode) -> Result<Self> {
        if self.confirmation.is_ok() {
            Ok(self)
        } else {
            Err(Error::Sensor {
                opcode,
                confirmation: self.confirmation,
            })
        }
    }

    /// Require at least `len` payload bytes
    pub fn require_payload(&self, opcode: Opcode, len: usize) -> Result<&[u8]> {
        if self.payload.len() < len {
            return Err(Error::UnexpectedPayload {
                opcode,
                len: self.payload.len(),
            });
        }
        Ok(&self.payload[..len])
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self {
            confirmation: response.confirmation,
            payload: response.payload,
        }
    }
}

/// Executes one command at a time over an owned channel
///
/// Each call flushes stale input, writes the command, and waits for one
/// validated acknowledgement. A frame that fails validation is an error,
/// never an `Ok` confirmation.
pub struct Executor {
    channel: Box<dyn Channel>,
    reader: FrameReader,
    address: u32,
}

impl Executor {
    /// Create an executor over `channel` using the broadcast address
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            channel,
            reader: FrameReader::new(),
            address: fprust_core::constants::DEFAULT_ADDRESS,
        }
    }

    /// Use a custom frame reader
    pub fn with_reader(mut self, reader: FrameReader) -> Self {
        self.reader = reader;
        self
    }

    /// Address commands to `address`
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Open the channel if it is not open yet
    pub async fn open(&mut self) -> Result<()> {
        if !self.channel.is_open() {
            self.channel.open().await?;
        }
        Ok(())
    }

    /// Close the channel
    pub async fn close(&mut self) -> Result<()> {
        self.channel.close().await?;
        Ok(())
    }

    /// Check if the channel is open
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Channel description for logs
    pub fn describe(&self) -> String {
        self.channel.describe()
    }

    /// Send one command and wait for its acknowledgement
    ///
    /// # Errors
    ///
    /// Transport errors from the channel or reader, and codec errors for
    /// frames that fail validation. Sensor confirmations are returned in
    /// the [`Reply`], not as errors.
    pub async fn execute(&mut self, opcode: Opcode, params: &[u8], timeout: Duration) -> Result<Reply> {
        self.channel.flush_input().await?;

        let frame = CommandPacket::new(opcode, Bytes::copy_from_slice(params))
            .with_address(self.address)
            .encode();

        trace!(%opcode, params = params.len(), "Sending command");
        self.channel.write(&frame).await?;

        let raw = self.reader.read_frame(&mut *self.channel, timeout).await?;
        let response = Response::decode(&raw)?;

        // The address sits outside the checksum
        if response.address != self.address {
            warn!(%opcode, address = format!("0x{:08X}", response.address), "Reply from wrong address");
            return Err(fprust_core::Error::MalformedFrame {
                reason: format!(
                    "reply from 0x{:08X}, expected 0x{:08X}",
                    response.address, self.address
                ),
            }
            .into());
        }

        let reply = Reply::from(response);

        debug!(%opcode, confirmation = %reply.confirmation, "Command completed");

        Ok(reply)
    }

    /// Like [`execute`](Self::execute), retrying transport failures per `policy`
    ///
    /// Commands that change library state run exactly once.
    pub async fn execute_with_retry(
        &mut self,
        opcode: Opcode,
        params: &[u8],
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Reply> {
        let retries = if opcode.is_mutating() { 0 } else { policy.retries };
        let mut attempt = 0;

        loop {
            match self.execute(opcode, params, timeout).await {
                Err(e) if e.is_transport() && attempt < retries => {
                    attempt += 1;
                    warn!(%opcode, attempt, error = %e, "Retrying command");
                    tokio::time::sleep(policy.delay).await;
                }
                result => return result,
            }
        }
    }
}
