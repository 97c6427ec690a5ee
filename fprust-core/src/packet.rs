//! AS608 packet structure and encoding/decoding

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    confirm::ConfirmationCode,
    constants::{pid, CHECKSUM_SIZE, DEFAULT_ADDRESS, HEADER, MIN_RESPONSE_SIZE, PREFIX_SIZE},
    error::{Error, Result},
    opcode::Opcode,
};

/// Host to module command packet
///
/// # Packet Structure
///
/// ```text
/// ┌─────────┬─────────┬──────┬─────────┬────────┬────────────┬──────────┐
/// │ Header  │ Address │ Type │ Length  │ Opcode │ Parameters │ Checksum │
/// │ EF 01   │ 4 bytes │ 0x01 │ 2 bytes │ 1 byte │  N bytes   │ 2 bytes  │
/// └─────────┴─────────┴──────┴─────────┴────────┴────────────┴──────────┘
/// ```
///
/// Length counts opcode, parameters and checksum. The checksum is the
/// 16-bit sum of every byte from the type field through the last
/// parameter. All multi-byte values are big-endian.
///
/// # Examples
///
/// ```
/// use fprust_core::{CommandPacket, Opcode};
///
/// let frame = CommandPacket::new(Opcode::GetImage, Vec::new()).encode();
/// assert_eq!(
///     frame.as_ref(),
///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
/// );
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct CommandPacket {
    /// Module address
    pub address: u32,

    /// Instruction code
    pub opcode: Opcode,

    /// Instruction parameters
    pub params: Bytes,
}

impl CommandPacket {
    /// Create a command addressed to the broadcast address
    pub fn new(opcode: Opcode, params: impl Into<Bytes>) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            opcode,
            params: params.into(),
        }
    }

    /// Override the module address
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Value of the length field
    pub fn length(&self) -> u16 {
        (1 + self.params.len() + CHECKSUM_SIZE) as u16
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PREFIX_SIZE + self.length() as usize);

        buf.put_slice(&HEADER);
        buf.put_u32(self.address);
        buf.put_u8(pid::COMMAND);
        buf.put_u16(self.length());
        buf.put_u8(self.opcode.into());
        buf.put_slice(&self.params);

        let sum = checksum::calculate(&buf[HEADER.len() + 4..]);
        buf.put_u16(sum);

        trace!(opcode = %self.opcode, frame = %hex::encode(&buf), "Encoded command");

        buf
    }
}

impl fmt::Debug for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPacket")
            .field("address", &format!("0x{:08X}", self.address))
            .field("opcode", &self.opcode)
            .field("params", &hex::encode(&self.params))
            .finish()
    }
}

impl fmt::Display for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command[{}](params={})", self.opcode, self.params.len())
    }
}

/// Module to host acknowledgement packet
///
/// # Packet Structure
///
/// ```text
/// ┌─────────┬─────────┬──────┬─────────┬──────────────┬─────────┬──────────┐
/// │ Header  │ Address │ Type │ Length  │ Confirmation │ Payload │ Checksum │
/// │ EF 01   │ 4 bytes │ 0x07 │ 2 bytes │    1 byte    │ N bytes │ 2 bytes  │
/// └─────────┴─────────┴──────┴─────────┴──────────────┴─────────┴──────────┘
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    /// Address the module answered from
    pub address: u32,

    /// Confirmation code
    pub confirmation: ConfirmationCode,

    /// Command specific data following the confirmation code
    pub payload: Bytes,
}

impl Response {
    /// Create a broadcast-addressed acknowledgement
    pub fn new(confirmation: ConfirmationCode, payload: impl Into<Bytes>) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            confirmation,
            payload: payload.into(),
        }
    }

    /// Value of the length field
    pub fn length(&self) -> u16 {
        (1 + self.payload.len() + CHECKSUM_SIZE) as u16
    }

    /// Encode the acknowledgement the way the module sends it
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PREFIX_SIZE + self.length() as usize);

        buf.put_slice(&HEADER);
        buf.put_u32(self.address);
        buf.put_u8(pid::ACK);
        buf.put_u16(self.length());
        buf.put_u8(self.confirmation.into());
        buf.put_slice(&self.payload);

        let sum = checksum::calculate(&buf[HEADER.len() + 4..]);
        buf.put_u16(sum);

        buf
    }

    /// Decode and validate an acknowledgement frame
    ///
    /// Bytes after the declared frame end are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than 12 bytes
    /// - Header is not `EF 01` or the type is not an acknowledgement
    /// - Declared length is below 3 or runs past the buffer
    /// - Checksum verification fails
    ///
    /// # Examples
    ///
    /// ```
    /// use fprust_core::{ConfirmationCode, Response};
    ///
    /// let frame = [0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x00, 0x03, 0x02, 0x00, 0x0C];
    /// let response = Response::decode(&frame).unwrap();
    /// assert_eq!(response.confirmation, ConfirmationCode::NoFinger);
    /// assert!(response.payload.is_empty());
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < MIN_RESPONSE_SIZE {
            return Err(Error::malformed(format!(
                "expected at least {} bytes, got {}",
                MIN_RESPONSE_SIZE,
                buf.len()
            )));
        }

        if buf[..HEADER.len()] != HEADER {
            return Err(Error::malformed(format!(
                "bad header {:02X} {:02X}",
                buf[0], buf[1]
            )));
        }

        let address = BigEndian::read_u32(&buf[2..6]);

        if buf[6] != pid::ACK {
            return Err(Error::malformed(format!(
                "expected acknowledgement, got packet type 0x{:02X}",
                buf[6]
            )));
        }

        let length = declared_length(buf).unwrap_or_default() as usize;
        if length < 1 + CHECKSUM_SIZE {
            return Err(Error::malformed(format!("declared length {} too small", length)));
        }

        let end = PREFIX_SIZE + length;
        if end > buf.len() {
            return Err(Error::malformed(format!(
                "declared length {} exceeds {} available bytes",
                length,
                buf.len() - PREFIX_SIZE
            )));
        }

        let content_end = end - CHECKSUM_SIZE;
        let expected = checksum::calculate(&buf[6..content_end]);
        let received = BigEndian::read_u16(&buf[content_end..end]);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        let response = Self {
            address,
            confirmation: ConfirmationCode::from(buf[PREFIX_SIZE]),
            payload: Bytes::copy_from_slice(&buf[PREFIX_SIZE + 1..content_end]),
        };

        trace!(
            confirmation = %response.confirmation,
            payload = %hex::encode(&response.payload),
            "Decoded response"
        );

        Ok(response)
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        PREFIX_SIZE + self.length() as usize
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("address", &format!("0x{:08X}", self.address))
            .field("confirmation", &self.confirmation)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response[{}](len={})",
            self.confirmation,
            self.payload.len()
        )
    }
}

/// Length field of a frame prefix, if at least the prefix is present
pub fn declared_length(prefix: &[u8]) -> Option<u16> {
    (prefix.len() >= PREFIX_SIZE).then(|| BigEndian::read_u16(&prefix[7..9]))
}

/// Offset of the first `EF 01` marker in `buf`
pub fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER.len()).position(|w| w == HEADER)
}
