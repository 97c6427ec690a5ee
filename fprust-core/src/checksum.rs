//! AS608 checksum algorithm
//!
//! From the module's user manual:
//! 1. Take every byte from the packet-type field through the last content byte
//! 2. Add them as unsigned values
//! 3. Keep the low 16 bits (carries beyond 0xFFFF are dropped)
//! 4. Transmit big-endian after the content

use tracing::trace;

/// Calculate the AS608 checksum over `bytes`
///
/// `bytes` must start at the packet-type field and end with the last
/// content byte (opcode and parameters, or confirmation and payload).
///
/// # Examples
///
/// ```
/// use fprust_core::checksum;
///
/// // Handshake command: type 0x01, length 0x0003, opcode 0x17
/// assert_eq!(checksum::calculate(&[0x01, 0x00, 0x03, 0x17]), 0x001B);
/// ```
pub fn calculate(bytes: &[u8]) -> u16 {
    let checksum = bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)));

    trace!(
        len = bytes.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify checksum
pub fn verify(bytes: &[u8], expected: u16) -> bool {
    calculate(bytes) == expected
}
