//! Opcode-driven fake sensor for unit tests

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use fprust_core::constants::PREFIX_SIZE;
use fprust_core::{ConfirmationCode, Opcode, Response};
use fprust_transport::MockChannel;

pub(crate) fn ack(confirmation: ConfirmationCode, payload: &[u8]) -> Bytes {
    Response::new(confirmation, payload.to_vec()).encode().freeze()
}

/// Answers each command from a per-opcode queue, falling back to a fixed reply
///
/// Commands with neither a queued nor a fixed reply go unanswered.
#[derive(Default)]
pub(crate) struct FakeSensor {
    queued: HashMap<u8, VecDeque<Vec<Bytes>>>,
    fixed: HashMap<u8, Vec<Bytes>>,
}

impl FakeSensor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue one reply for the next `opcode` command
    pub(crate) fn reply(self, opcode: Opcode, confirmation: ConfirmationCode) -> Self {
        self.reply_with(opcode, confirmation, &[])
    }

    /// Queue one reply carrying `payload`
    pub(crate) fn reply_with(
        mut self,
        opcode: Opcode,
        confirmation: ConfirmationCode,
        payload: &[u8],
    ) -> Self {
        self.queued
            .entry(opcode.into())
            .or_default()
            .push_back(vec![ack(confirmation, payload)]);
        self
    }

    /// Queue a reply delivered as raw fragments
    pub(crate) fn reply_raw(mut self, opcode: Opcode, fragments: Vec<Bytes>) -> Self {
        self.queued
            .entry(opcode.into())
            .or_default()
            .push_back(fragments);
        self
    }

    /// Queue `count` identical replies
    pub(crate) fn reply_times(mut self, opcode: Opcode, confirmation: ConfirmationCode, count: usize) -> Self {
        for _ in 0..count {
            self = self.reply(opcode, confirmation);
        }
        self
    }

    /// Answer every `opcode` command without a queued reply with `confirmation`
    pub(crate) fn always(self, opcode: Opcode, confirmation: ConfirmationCode) -> Self {
        self.always_with(opcode, confirmation, &[])
    }

    pub(crate) fn always_with(
        mut self,
        opcode: Opcode,
        confirmation: ConfirmationCode,
        payload: &[u8],
    ) -> Self {
        self.fixed
            .insert(opcode.into(), vec![ack(confirmation, payload)]);
        self
    }

    /// Startup exchange of a healthy 162-slot sensor holding `count` templates
    pub(crate) fn booting(self, count: u16) -> Self {
        let params = [
            0x00, 0x04, 0x00, 0x09, 0x00, 0xA2, 0x00, 0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x02,
            0x00, 0x06,
        ];
        self.reply(Opcode::Handshake, ConfirmationCode::Ok)
            .reply(Opcode::VerifyPassword, ConfirmationCode::Ok)
            .reply_with(Opcode::ReadSysPara, ConfirmationCode::Ok, &params)
            .reply_with(Opcode::TemplateCount, ConfirmationCode::Ok, &count.to_be_bytes())
    }

    pub(crate) fn into_channel(mut self) -> MockChannel {
        MockChannel::with_responder(move |frame| {
            let Some(&opcode) = frame.get(PREFIX_SIZE) else {
                return Vec::new();
            };

            if let Some(reply) = self.queued.get_mut(&opcode).and_then(|q| q.pop_front()) {
                return reply;
            }
            self.fixed.get(&opcode).cloned().unwrap_or_default()
        })
    }
}
