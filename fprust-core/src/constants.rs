//! Protocol constants

use std::time::Duration;

/// Frame start marker, always the first two bytes of every packet
pub const HEADER: [u8; 2] = [0xEF, 0x01];

/// Broadcast module address accepted by factory-configured sensors
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Factory default module password
pub const DEFAULT_PASSWORD: u32 = 0x0000_0000;

/// Default UART speed of the module
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Library capacity assumed when the sensor cannot be asked
pub const DEFAULT_LIBRARY_SIZE: u16 = 162;

/// Bytes before the content: header(2) + address(4) + type(1) + length(2)
pub const PREFIX_SIZE: usize = 9;

/// Smallest valid response: prefix + confirmation(1) + checksum(2)
pub const MIN_RESPONSE_SIZE: usize = PREFIX_SIZE + 3;

/// Largest frame the reader will accept (data packets top out at 256 bytes of content)
pub const MAX_FRAME_SIZE: usize = PREFIX_SIZE + 256 + 2;

/// Checksum trailer width
pub const CHECKSUM_SIZE: usize = 2;

/// Character buffer used for the first capture and for searches
pub const CHAR_BUFFER_1: u8 = 0x01;

/// Character buffer used for the second enrollment capture
pub const CHAR_BUFFER_2: u8 = 0x02;

/// Number of slots covered by one index-table page
pub const INDEX_PAGE_SLOTS: u16 = 256;

/// Size of an index-table page bitmap
pub const INDEX_PAGE_BYTES: usize = 32;

/// Size of the system parameter block
pub const SYSTEM_PARAMETERS_SIZE: usize = 16;

/// Default deadline for a single command round trip
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1500);

/// Deadline for commands the module needs longer for (feature extraction, search)
pub const DEFAULT_SLOW_COMMAND_TIMEOUT: Duration = Duration::from_millis(3000);

/// Upper bound of a single read attempt inside a command deadline
pub const DEFAULT_READ_SLICE: Duration = Duration::from_millis(100);

/// Extra reads allowed while hunting for a header before giving up
pub const DEFAULT_MAX_SYNC_ATTEMPTS: usize = 16;

/// Retries per workflow state before the workflow aborts
pub const MAX_RETRIES: u8 = 3;

/// Delay between finger polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Delay between finger polls once the sensor has been idle for a while
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Empty polls before switching to the idle interval
pub const DEFAULT_IDLE_THRESHOLD: u32 = 3;

/// Request queue depth between callers and the worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Event channel depth
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// How long a caller waits for room in the request queue
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Packet identifiers (the type field)
pub mod pid {
    /// Host to module command
    pub const COMMAND: u8 = 0x01;

    /// Data packet with more to follow
    pub const DATA: u8 = 0x02;

    /// Module to host acknowledgement
    pub const ACK: u8 = 0x07;

    /// Last data packet
    pub const END_DATA: u8 = 0x08;

    /// Whether `value` is a packet type the module can emit or accept
    pub fn is_known(value: u8) -> bool {
        matches!(value, COMMAND | DATA | ACK | END_DATA)
    }
}

