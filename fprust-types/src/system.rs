//! Sensor system parameters

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use fprust_core::constants::SYSTEM_PARAMETERS_SIZE;

use crate::error::{Error, Result};

bitflags! {
    /// System status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// Module is executing a command
        const BUSY = 1 << 0;
        /// Last match or search succeeded
        const PASS = 1 << 1;
        /// Handshake password verified
        const PASSWORD_VERIFIED = 1 << 2;
        /// Image buffer holds a valid image
        const IMAGE_VALID = 1 << 3;
    }
}

/// Contents of the 16-byte system parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemParameters {
    /// Status register
    pub status: StatusFlags,

    /// System identifier code
    pub system_id: u16,

    /// Number of template slots
    pub library_size: u16,

    /// Match threshold (1-5)
    pub security_level: u16,

    /// Module address
    pub device_address: u32,

    /// Data packet size code (0 = 32 bytes ... 3 = 256 bytes)
    pub packet_size_code: u16,

    /// Baud rate as a multiple of 9600
    pub baud_multiplier: u16,
}

impl SystemParameters {
    /// Parse the payload of a ReadSysPara acknowledgement
    ///
    /// # Examples
    ///
    /// ```
    /// use fprust_types::SystemParameters;
    ///
    /// let block = [
    ///     0x00, 0x04, 0x00, 0x09, 0x00, 0xA2, 0x00, 0x03,
    ///     0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x02, 0x00, 0x06,
    /// ];
    /// let params = SystemParameters::parse(&block).unwrap();
    /// assert_eq!(params.library_size, 162);
    /// assert_eq!(params.baud_rate(), 57_600);
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < SYSTEM_PARAMETERS_SIZE {
            return Err(Error::Parse(format!(
                "system parameters need {} bytes, got {}",
                SYSTEM_PARAMETERS_SIZE,
                payload.len()
            )));
        }

        Ok(Self {
            status: StatusFlags::from_bits_retain(BigEndian::read_u16(&payload[0..2])),
            system_id: BigEndian::read_u16(&payload[2..4]),
            library_size: BigEndian::read_u16(&payload[4..6]),
            security_level: BigEndian::read_u16(&payload[6..8]),
            device_address: BigEndian::read_u32(&payload[8..12]),
            packet_size_code: BigEndian::read_u16(&payload[12..14]),
            baud_multiplier: BigEndian::read_u16(&payload[14..16]),
        })
    }

    /// Data packet size in bytes
    pub fn packet_size(&self) -> usize {
        32 << self.packet_size_code.min(3)
    }

    /// UART speed in bits per second
    pub fn baud_rate(&self) -> u32 {
        u32::from(self.baud_multiplier) * 9600
    }

    /// Check if the module is busy
    pub fn is_busy(&self) -> bool {
        self.status.contains(StatusFlags::BUSY)
    }

    /// Check if the password was verified
    pub fn password_verified(&self) -> bool {
        self.status.contains(StatusFlags::PASSWORD_VERIFIED)
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor[addr: 0x{:08X}, library: {}, security: {}, packet: {}B, baud: {}]",
            self.device_address,
            self.library_size,
            self.security_level,
            self.packet_size(),
            self.baud_rate()
        )
    }
}
