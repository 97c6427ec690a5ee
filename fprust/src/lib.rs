//! # fprust
//!
//! Async driver for AS608-family optical fingerprint sensors.
//!
//! ## Features
//!
//! - Checksummed packet codec with header resynchronisation
//! - Enrollment and identification workflows driven by a single worker task
//! - Library inventory and delete operations
//! - Serial, TCP bridge, and scripted mock channels
//!
//! ## Quick Start
//!
//! ```no_run
//! use fprust::{Engine, SensorConfig, SensorEvent, SerialChannel};
//!
//! #[tokio::main]
//! async fn main() -> fprust::Result<()> {
//!     let channel = SerialChannel::new("/dev/ttyUSB0").with_baud_rate(57600);
//!     let engine = Engine::start(channel, SensorConfig::default()).await?;
//!     let handle = engine.handle();
//!
//!     // Identify one finger
//!     let mut events = handle.subscribe();
//!     handle.start_search().await?;
//!
//!     while let Ok(record) = events.recv().await {
//!         match record.event {
//!             SensorEvent::MatchFound { slot, score } => println!("slot {} ({})", slot, score),
//!             SensorEvent::MatchNotFound => println!("unknown finger"),
//!             SensorEvent::FingerRemoved => break,
//!             _ => {}
//!         }
//!     }
//!
//!     engine.shutdown().await
//! }
//! ```

pub mod config;
pub mod engine;
pub mod enroll;
pub mod error;
pub mod executor;
pub mod search;
pub mod sensor;
pub mod workflow;

mod worker;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{RetryPolicy, SensorConfig};
pub use engine::{Engine, EngineHandle};
pub use enroll::EnrollMachine;
pub use error::{Error, Result};
pub use executor::{Executor, Reply};
pub use search::{SearchCycle, SearchMode};
pub use sensor::Sensor;
pub use workflow::{EventSink, Progress};

// Re-export protocol and transport types
pub use fprust_core::{ConfirmationCode, Opcode, Session, SessionState};
pub use fprust_transport::{Channel, MockChannel, SerialChannel, TcpChannel};
pub use fprust_types::{
    DeleteTarget, EnrollStage, EventRecord, FailureReason, IndexTable, SearchMatch, SearchStage,
    SensorEvent, Stage, SystemParameters, TransportFailure,
};
