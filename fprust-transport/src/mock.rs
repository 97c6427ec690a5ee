//! Scripted in-memory channel
//!
//! Stands in for a sensor in tests and demos: every written command is
//! recorded and answered by a responder that returns the reply as a list
//! of fragments, delivered one fragment per read.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use fprust_core::constants::PREFIX_SIZE;

use crate::{error::*, Channel};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Bytes> + Send>;

struct MockState {
    open: bool,
    incoming: VecDeque<Bytes>,
    written: Vec<Bytes>,
    responder: Responder,
    closed_by_remote: bool,
}

/// In-memory channel driven by a responder
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

/// Inspection handle sharing state with a [`MockChannel`]
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    /// Channel whose responder answers each written frame
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Bytes> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: false,
                incoming: VecDeque::new(),
                written: Vec::new(),
                responder: Box::new(responder),
                closed_by_remote: false,
            })),
        }
    }

    /// Channel answering the n-th write with the n-th scripted reply
    ///
    /// Writes past the end of the script get no answer.
    pub fn scripted(replies: Vec<Vec<Bytes>>) -> Self {
        let mut replies = VecDeque::from(replies);
        Self::with_responder(move |_| replies.pop_front().unwrap_or_default())
    }

    /// Channel that never answers
    pub fn silent() -> Self {
        Self::with_responder(|_| Vec::new())
    }

    /// Queue bytes as if the sensor had sent them unprompted
    pub fn push_incoming(&self, fragment: impl Into<Bytes>) {
        self.state.lock().incoming.push_back(fragment.into());
    }

    /// Report end of stream once queued bytes are consumed
    pub fn close_after_incoming(&self) {
        self.state.lock().closed_by_remote = true;
    }

    /// Inspection handle for use after the channel has been moved away
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockHandle {
    /// Every frame written so far
    pub fn written(&self) -> Vec<Bytes> {
        self.state.lock().written.clone()
    }

    /// Opcodes of every command written so far
    pub fn opcodes(&self) -> Vec<u8> {
        self.state
            .lock()
            .written
            .iter()
            .filter_map(|frame| frame.get(PREFIX_SIZE).copied())
            .collect()
    }

    /// Number of frames written so far
    pub fn write_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Check if the channel is open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.open {
            return Err(Error::AlreadyOpen);
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::NotOpen);
        }

        trace!("Mock received {} bytes: {}", data.len(), hex::encode(data));

        state.written.push(Bytes::copy_from_slice(data));
        let reply = (state.responder)(data);
        state.incoming.extend(reply);
        Ok(())
    }

    async fn read(&mut self, buf: &mut BytesMut, wait: Duration) -> Result<usize> {
        {
            let mut state = self.state.lock();
            if !state.open {
                return Err(Error::NotOpen);
            }

            if let Some(fragment) = state.incoming.pop_front() {
                buf.extend_from_slice(&fragment);
                return Ok(fragment.len());
            }

            if state.closed_by_remote {
                return Err(Error::ConnectionClosed);
            }
        }

        tokio::time::sleep(wait).await;
        Ok(0)
    }

    async fn flush_input(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::NotOpen);
        }
        state.incoming.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
