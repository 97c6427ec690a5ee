//! Confirmation codes returned in every acknowledgement

use std::fmt;

/// Confirmation code carried by an acknowledgement packet
///
/// Codes the module documents but this crate has no name for are kept
/// as [`ConfirmationCode::Unknown`] rather than rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfirmationCode {
    Ok,
    PacketError,
    NoFinger,
    ImageCaptureFailed,
    ImageDisorder,
    ImageTooSmall,
    NoMatch,
    NotFound,
    CombineFail,
    BadLocation,
    TemplateReadFail,
    UploadFail,
    ReceiveDataFail,
    ImageUploadFail,
    DeleteFail,
    ClearFail,
    BadPassword,
    InvalidImage,
    FlashError,
    UndefinedError,
    InvalidRegister,
    BadConfig,
    BadNotepadPage,
    PortFailure,
    Unknown(u8),
}

impl ConfirmationCode {
    /// Success
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Nothing on the sensor window
    pub fn is_no_finger(self) -> bool {
        self == Self::NoFinger
    }

    /// Normal polling outcomes that gate transitions without counting as failures
    pub fn is_expected_negative(self) -> bool {
        matches!(self, Self::NoFinger | Self::NoMatch | Self::NotFound)
    }

    /// Anything that is neither success nor an expected negative
    pub fn is_failure(self) -> bool {
        !self.is_ok() && !self.is_expected_negative()
    }

    /// Wire value
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::PacketError => 0x01,
            Self::NoFinger => 0x02,
            Self::ImageCaptureFailed => 0x03,
            Self::ImageDisorder => 0x06,
            Self::ImageTooSmall => 0x07,
            Self::NoMatch => 0x08,
            Self::NotFound => 0x09,
            Self::CombineFail => 0x0A,
            Self::BadLocation => 0x0B,
            Self::TemplateReadFail => 0x0C,
            Self::UploadFail => 0x0D,
            Self::ReceiveDataFail => 0x0E,
            Self::ImageUploadFail => 0x0F,
            Self::DeleteFail => 0x10,
            Self::ClearFail => 0x11,
            Self::BadPassword => 0x13,
            Self::InvalidImage => 0x15,
            Self::FlashError => 0x18,
            Self::UndefinedError => 0x19,
            Self::InvalidRegister => 0x1A,
            Self::BadConfig => 0x1B,
            Self::BadNotepadPage => 0x1C,
            Self::PortFailure => 0x1D,
            Self::Unknown(code) => code,
        }
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "command executed",
            Self::PacketError => "error receiving packet",
            Self::NoFinger => "no finger on the sensor",
            Self::ImageCaptureFailed => "failed to enroll the finger",
            Self::ImageDisorder => "image too disorderly to generate features",
            Self::ImageTooSmall => "image too small to generate features",
            Self::NoMatch => "finger does not match",
            Self::NotFound => "no matching finger found",
            Self::CombineFail => "failed to combine character files",
            Self::BadLocation => "address beyond the finger library",
            Self::TemplateReadFail => "error reading template from library",
            Self::UploadFail => "error uploading template",
            Self::ReceiveDataFail => "module cannot receive following data packets",
            Self::ImageUploadFail => "error uploading image",
            Self::DeleteFail => "failed to delete template",
            Self::ClearFail => "failed to clear finger library",
            Self::BadPassword => "wrong password",
            Self::InvalidImage => "no valid primary image",
            Self::FlashError => "error writing flash",
            Self::UndefinedError => "undefined error",
            Self::InvalidRegister => "invalid register number",
            Self::BadConfig => "incorrect register configuration",
            Self::BadNotepadPage => "wrong notepad page number",
            Self::PortFailure => "failed to operate the communication port",
            Self::Unknown(_) => "unknown confirmation code",
        }
    }
}

impl From<u8> for ConfirmationCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::PacketError,
            0x02 => Self::NoFinger,
            0x03 => Self::ImageCaptureFailed,
            0x06 => Self::ImageDisorder,
            0x07 => Self::ImageTooSmall,
            0x08 => Self::NoMatch,
            0x09 => Self::NotFound,
            0x0A => Self::CombineFail,
            0x0B => Self::BadLocation,
            0x0C => Self::TemplateReadFail,
            0x0D => Self::UploadFail,
            0x0E => Self::ReceiveDataFail,
            0x0F => Self::ImageUploadFail,
            0x10 => Self::DeleteFail,
            0x11 => Self::ClearFail,
            0x13 => Self::BadPassword,
            0x15 => Self::InvalidImage,
            0x18 => Self::FlashError,
            0x19 => Self::UndefinedError,
            0x1A => Self::InvalidRegister,
            0x1B => Self::BadConfig,
            0x1C => Self::BadNotepadPage,
            0x1D => Self::PortFailure,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConfirmationCode> for u8 {
    fn from(code: ConfirmationCode) -> u8 {
        code.code()
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classification() {
        assert!(ConfirmationCode::Ok.is_ok());
        assert!(!ConfirmationCode::Ok.is_failure());

        assert!(ConfirmationCode::NoFinger.is_no_finger());
        assert!(ConfirmationCode::NoFinger.is_expected_negative());
        assert!(ConfirmationCode::NotFound.is_expected_negative());
        assert!(ConfirmationCode::NoMatch.is_expected_negative());

        assert!(ConfirmationCode::CombineFail.is_failure());
        assert!(ConfirmationCode::BadLocation.is_failure());
        assert!(ConfirmationCode::Unknown(0x42).is_failure());
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(ConfirmationCode::from(0x0A), ConfirmationCode::CombineFail);
        assert_eq!(ConfirmationCode::from(0x0B), ConfirmationCode::BadLocation);
        assert_eq!(ConfirmationCode::from(0x18), ConfirmationCode::FlashError);
        assert_eq!(ConfirmationCode::from(0x04), ConfirmationCode::Unknown(0x04));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ConfirmationCode::NoFinger.to_string(),
            "0x02 (no finger on the sensor)"
        );
    }

    proptest! {
        #[test]
        fn prop_wire_value_preserved(raw in any::<u8>()) {
            prop_assert_eq!(ConfirmationCode::from(raw).code(), raw);
        }
    }
}
