//! # fprust-core
//!
//! Core protocol implementation for AS608-family fingerprint sensors.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding
//! - Checksum calculation
//! - Instruction and confirmation code definitions
//! - Workflow session bookkeeping
//! - Protocol constants
//!
//! Nothing here performs I/O.

pub mod checksum;
pub mod confirm;
pub mod constants;
pub mod error;
pub mod opcode;
pub mod packet;
pub mod session;

pub use confirm::ConfirmationCode;
pub use error::{Error, Result};
pub use opcode::Opcode;
pub use packet::{CommandPacket, Response};
pub use session::{Session, SessionState};
