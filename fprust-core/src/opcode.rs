//! AS608 instruction codes

use std::fmt;

use crate::error::{Error, Result};

/// Instruction codes understood by the module
///
/// Only the subset used by the enroll/identify/delete workflows and the
/// startup diagnostics is listed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Capture a finger image into the image buffer
    GetImage = 0x01,

    /// Extract features from the image buffer into a character buffer
    GenChar = 0x02,

    /// Compare character buffers 1 and 2
    Match = 0x03,

    /// Search the library with a character buffer
    Search = 0x04,

    /// Merge character buffers 1 and 2 into a template
    RegModel = 0x05,

    /// Store a character buffer into a library slot
    StoreChar = 0x06,

    /// Delete a run of library slots
    DeleteChar = 0x0C,

    /// Clear the whole library
    Empty = 0x0D,

    /// Read the system parameter block
    ReadSysPara = 0x0F,

    /// Verify the module password
    VerifyPassword = 0x13,

    /// Liveness check
    Handshake = 0x17,

    /// Number of stored templates
    TemplateCount = 0x1D,

    /// Occupancy bitmap of one library page
    ReadIndexTable = 0x1F,
}

impl Opcode {
    /// Whether the command changes library state and must not be replayed
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::RegModel | Self::StoreChar | Self::DeleteChar | Self::Empty
        )
    }

    /// Get opcode name
    pub fn name(self) -> &'static str {
        match self {
            Self::GetImage => "PS_GetImage",
            Self::GenChar => "PS_GenChar",
            Self::Match => "PS_Match",
            Self::Search => "PS_Search",
            Self::RegModel => "PS_RegModel",
            Self::StoreChar => "PS_StoreChar",
            Self::DeleteChar => "PS_DeletChar",
            Self::Empty => "PS_Empty",
            Self::ReadSysPara => "PS_ReadSysPara",
            Self::VerifyPassword => "PS_VfyPwd",
            Self::Handshake => "PS_HandShake",
            Self::TemplateCount => "PS_ValidTempleteNum",
            Self::ReadIndexTable => "PS_ReadIndexTable",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GetImage),
            0x02 => Ok(Self::GenChar),
            0x03 => Ok(Self::Match),
            0x04 => Ok(Self::Search),
            0x05 => Ok(Self::RegModel),
            0x06 => Ok(Self::StoreChar),
            0x0C => Ok(Self::DeleteChar),
            0x0D => Ok(Self::Empty),
            0x0F => Ok(Self::ReadSysPara),
            0x13 => Ok(Self::VerifyPassword),
            0x17 => Ok(Self::Handshake),
            0x1D => Ok(Self::TemplateCount),
            0x1F => Ok(Self::ReadIndexTable),
            _ => Err(Error::UnknownOpcode(value)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
