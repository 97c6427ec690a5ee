//! Workflow session bookkeeping
//!
//! A session tracks which workflow currently owns the sensor:
//! - Idle, enrolling into a slot, or searching
//! - Library capacity used to validate slot ids
//!
//! Callers claim a workflow here before handing it to the worker, so two
//! competing requests are resolved synchronously instead of in the queue.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No workflow active
    Idle,

    /// Enrollment into `slot` in progress
    Enrolling {
        slot: u16,
    },

    /// Identification cycle in progress
    Searching,
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Number of template slots in the library
    capacity: AtomicU16,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    /// Create an idle session for a library of `capacity` templates
    pub fn new(capacity: u16) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                capacity: AtomicU16::new(capacity),
                state: parking_lot::RwLock::new(SessionState::Idle),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Library capacity
    pub fn capacity(&self) -> u16 {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Replace the library capacity (after reading it from the sensor)
    pub fn set_capacity(&self, capacity: u16) {
        self.inner.capacity.store(capacity, Ordering::Release);
    }

    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self.state(), SessionState::Idle)
    }

    /// Check if an enrollment is active
    pub fn is_enrolling(&self) -> bool {
        matches!(self.state(), SessionState::Enrolling { .. })
    }

    /// Check if an identification cycle is active
    pub fn is_searching(&self) -> bool {
        matches!(self.state(), SessionState::Searching)
    }

    /// Check that `slot` addresses the library
    pub fn validate_slot(&self, slot: u16) -> Result<()> {
        let capacity = self.capacity();
        if slot >= capacity {
            return Err(Error::SlotOutOfRange { slot, capacity });
        }
        Ok(())
    }

    /// Check that `count` slots starting at `start` address the library
    pub fn validate_range(&self, start: u16, count: u16) -> Result<()> {
        let capacity = self.capacity();
        let end = u32::from(start) + u32::from(count);
        if count == 0 || end > u32::from(capacity) {
            return Err(Error::SlotOutOfRange {
                slot: start.saturating_add(count.saturating_sub(1)),
                capacity,
            });
        }
        Ok(())
    }

    /// Claim the sensor for an enrollment into `slot`
    pub fn begin_enroll(&self, slot: u16) -> Result<()> {
        self.validate_slot(slot)?;
        self.claim(SessionState::Enrolling { slot })
    }

    /// Claim the sensor for an identification cycle
    pub fn begin_search(&self) -> Result<()> {
        self.claim(SessionState::Searching)
    }

    fn claim(&self, next: SessionState) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Idle {
            return Err(Error::InvalidSessionState(format!(
                "Cannot start {:?} while {:?}",
                next, *state
            )));
        }

        *state = next;
        debug!(state = ?next, "Session claimed");

        Ok(())
    }

    /// Return to idle if the session is still in `expected`
    ///
    /// Returns `false` when another transition already moved the session on.
    pub fn finish(&self, expected: SessionState) -> bool {
        let mut state = self.inner.state.write();

        if *state != expected {
            return false;
        }

        *state = SessionState::Idle;
        debug!(state = ?expected, "Session finished");
        true
    }

    /// Force the session back to idle
    pub fn reset(&self) {
        *self.inner.state.write() = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new(162);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.capacity(), 162);
        assert!(session.is_idle());
    }

    #[test]
    fn test_begin_enroll() {
        let session = Session::new(162);
        session.begin_enroll(5).unwrap();

        assert_eq!(session.state(), SessionState::Enrolling { slot: 5 });
        assert!(session.is_enrolling());
        assert!(!session.is_searching());
    }

    #[test]
    fn test_enroll_slot_out_of_range() {
        let session = Session::new(162);

        assert!(matches!(
            session.begin_enroll(162),
            Err(Error::SlotOutOfRange { slot: 162, capacity: 162 })
        ));
        assert!(session.is_idle());
    }

    #[test]
    fn test_enroll_rejected_while_searching() {
        let session = Session::new(162);
        session.begin_search().unwrap();

        assert!(matches!(
            session.begin_enroll(3),
            Err(Error::InvalidSessionState(_))
        ));
        // Active search untouched
        assert_eq!(session.state(), SessionState::Searching);
    }

    #[test]
    fn test_second_enroll_rejected() {
        let session = Session::new(162);
        session.begin_enroll(1).unwrap();

        assert!(session.begin_enroll(2).is_err());
        assert!(session.begin_search().is_err());
        assert_eq!(session.state(), SessionState::Enrolling { slot: 1 });
    }

    #[test]
    fn test_finish() {
        let session = Session::new(162);
        session.begin_enroll(7).unwrap();

        // Wrong expectation leaves the session alone
        assert!(!session.finish(SessionState::Searching));
        assert!(session.is_enrolling());

        assert!(session.finish(SessionState::Enrolling { slot: 7 }));
        assert!(session.is_idle());

        session.begin_search().unwrap();
        assert!(session.is_searching());
    }

    #[test]
    fn test_validate_range() {
        let session = Session::new(162);

        assert!(session.validate_range(0, 162).is_ok());
        assert!(session.validate_range(160, 2).is_ok());
        assert!(session.validate_range(160, 3).is_err());
        assert!(session.validate_range(10, 0).is_err());
        assert!(session.validate_range(u16::MAX, u16::MAX).is_err());
    }

    #[test]
    fn test_set_capacity() {
        let session = Session::new(162);
        session.set_capacity(300);

        assert!(session.validate_slot(250).is_ok());
        assert!(session.validate_slot(300).is_err());
    }

    #[test]
    fn test_session_clone() {
        let session1 = Session::new(162);
        let session2 = session1.clone();

        session1.begin_search().unwrap();

        // Both share same state
        assert!(session2.is_searching());

        session2.reset();
        assert!(session1.is_idle());
    }
}
