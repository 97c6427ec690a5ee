//! Type definitions for fprust

pub mod error;
pub mod event;
pub mod library;
pub mod system;

pub use error::{Error, Result};
pub use event::{
    DeleteTarget, EnrollStage, EventRecord, FailureReason, SearchStage, SensorEvent, Stage,
    TransportFailure,
};
pub use library::{IndexTable, SearchMatch};
pub use system::{StatusFlags, SystemParameters};
