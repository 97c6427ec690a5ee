//! Response frame assembly
//!
//! The sensor answers with a frame that may arrive in several pieces and
//! may be preceded by line noise or the tail of an earlier reply. The
//! reader accumulates bytes until one complete frame is available:
//!
//! 1. Wait for the 9-byte prefix (header, address, type, length)
//! 2. If `EF 01` is not at the start, drop everything before it
//! 3. Read the `length` bytes the prefix announces
//! 4. If the checksum does not match, drop one byte and look again
//!
//! A header whose frame cannot be completed yet is abandoned as soon as a
//! later header in the buffer carries a complete, checksummed frame. This
//! is how a truncated stale reply in front of the real one is skipped.
//!
//! Every read attempt is capped at a short slice of the remaining
//! deadline so that the overall timeout is honored.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use fprust_core::checksum;
use fprust_core::constants::{
    pid, DEFAULT_MAX_SYNC_ATTEMPTS, DEFAULT_READ_SLICE, HEADER, MAX_FRAME_SIZE, PREFIX_SIZE,
};
use fprust_core::packet::{declared_length, find_header};

use crate::{error::*, Channel};

/// Assembles complete response frames from a [`Channel`]
#[derive(Debug, Clone)]
pub struct FrameReader {
    read_slice: Duration,
    max_sync_attempts: usize,
}

impl FrameReader {
    /// Reader with the default 100 ms read slice
    pub fn new() -> Self {
        Self {
            read_slice: DEFAULT_READ_SLICE,
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
        }
    }

    /// Set the upper bound of a single read attempt
    pub fn with_read_slice(mut self, read_slice: Duration) -> Self {
        self.read_slice = read_slice;
        self
    }

    /// Set how many reads may be spent hunting for a header
    pub fn with_max_sync_attempts(mut self, attempts: usize) -> Self {
        self.max_sync_attempts = attempts;
        self
    }

    /// Read exactly one frame within `timeout`
    ///
    /// Bytes arriving after the frame in the same read are discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the deadline passes before a complete frame
    /// - [`Error::NoSync`] if no header shows up within the sync budget
    /// - Any channel error
    pub async fn read_frame<C>(&self, channel: &mut C, timeout: Duration) -> Result<BytesMut>
    where
        C: Channel + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
        let mut discarded = 0usize;
        let mut sync_reads = 0usize;

        loop {
            discarded += align(&mut buf);

            if buf.len() >= PREFIX_SIZE {
                let Some(frame_len) = announced_len(&buf) else {
                    // Header bytes inside noise; skip past this false start
                    trace!(packet_type = buf[6], "Rejected false header");
                    buf.advance(1);
                    discarded += 1;
                    continue;
                };

                if buf.len() >= frame_len {
                    if !checksum_ok(&buf[..frame_len]) {
                        debug!(len = frame_len, frame = %hex::encode(&buf[..frame_len]), "Dropped frame with bad checksum");
                        buf.advance(1);
                        discarded += 1;
                        continue;
                    }

                    if discarded > 0 {
                        debug!(discarded, "Resynchronized on frame header");
                    }
                    let frame = buf.split_to(frame_len);
                    trace!(len = frame.len(), frame = %hex::encode(&frame), "Frame received");
                    return Ok(frame);
                }

                if let Some(offset) = later_frame(&buf) {
                    trace!(offset, "Skipped truncated frame");
                    buf.advance(offset);
                    discarded += offset;
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(received = buf.len(), discarded, "Timed out waiting for frame");
                return Err(Error::Timeout { received: buf.len() });
            }

            let searching = discarded > 0 && !buf.starts_with(&HEADER);
            if searching {
                sync_reads += 1;
                if sync_reads > self.max_sync_attempts {
                    warn!(discarded, "Gave up searching for frame header");
                    return Err(Error::NoSync { discarded });
                }
            }

            let slice = self.read_slice.min(deadline - now);
            channel.read(&mut buf, slice).await?;
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop bytes until `buf` starts with a header, returning how many were dropped
///
/// A trailing `EF` is kept since it may be the first half of a split header.
fn align(buf: &mut BytesMut) -> usize {
    if buf.is_empty() || buf.starts_with(&HEADER) {
        return 0;
    }

    let skip = match find_header(&buf[..]) {
        Some(offset) => offset,
        None if buf[buf.len() - 1] == HEADER[0] => buf.len() - 1,
        None => buf.len(),
    };

    buf.advance(skip);
    skip
}

/// Total size of the frame announced at the front of `buf`
///
/// `None` when the prefix is incomplete or cannot start a real frame.
fn announced_len(buf: &[u8]) -> Option<usize> {
    let length = declared_length(buf)? as usize;
    let frame_len = PREFIX_SIZE + length;

    (pid::is_known(buf[6]) && length >= 3 && frame_len <= MAX_FRAME_SIZE).then_some(frame_len)
}

/// Checksum over type, length, and content matches the trailer
fn checksum_ok(frame: &[u8]) -> bool {
    let (body, trailer) = frame[6..].split_at(frame.len() - 8);
    checksum::verify(body, u16::from_be_bytes([trailer[0], trailer[1]]))
}

/// Offset of the first complete, valid frame past the front of `buf`
fn later_frame(buf: &[u8]) -> Option<usize> {
    (1..buf.len())
        .filter(|&offset| buf[offset..].starts_with(&HEADER))
        .find(|&offset| {
            let rest = &buf[offset..];
            announced_len(rest).is_some_and(|len| rest.len() >= len && checksum_ok(&rest[..len]))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChannel;
    use bytes::Bytes;
    use fprust_core::{ConfirmationCode, Response};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn search_reply() -> BytesMut {
        Response::new(ConfirmationCode::Ok, vec![0x00, 0x07, 0x00, 0x64]).encode()
    }

    async fn open_with(fragments: Vec<Bytes>) -> MockChannel {
        let mut channel = MockChannel::silent();
        channel.open().await.unwrap();
        for fragment in fragments {
            channel.push_incoming(fragment);
        }
        channel
    }

    #[tokio::test(start_paused = true)]
    async fn test_whole_frame() {
        let frame = search_reply();
        let mut channel = open_with(vec![frame.clone().freeze()]).await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_by_byte() {
        let frame = search_reply();
        let fragments = frame.iter().map(|&b| Bytes::copy_from_slice(&[b])).collect();
        let mut channel = open_with(fragments).await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_header() {
        let frame = search_reply();
        let mut channel = open_with(vec![
            Bytes::from_static(&[0x55, 0xEF]),
            frame.clone().freeze().slice(1..),
        ])
        .await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_bytes_not_included() {
        let frame = search_reply();
        let mut data = frame.to_vec();
        data.extend_from_slice(&[0xEF, 0x01, 0xFF]);
        let mut channel = open_with(vec![Bytes::from(data)]).await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_header_skipped() {
        let frame = search_reply();
        // EF 01 followed by an unknown packet type
        let mut data = vec![0xEF, 0x01, 0x00, 0x00, 0x00, 0x00, 0x55, 0x00, 0x03];
        data.extend_from_slice(&frame);
        let mut channel = open_with(vec![Bytes::from(data)]).await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_prefix_skipped() {
        let frame = search_reply();
        // First ten bytes of an earlier NoFinger acknowledgement
        let mut data = vec![0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x00, 0x03, 0x02];
        data.extend_from_slice(&frame);
        let mut channel = open_with(vec![Bytes::from(data)]).await;

        let read = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(read, frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_truncated_stale_frame_skipped() {
        let frame = search_reply();
        let stale = Response::new(ConfirmationCode::NotFound, vec![0x00; 4]).encode();

        for cut in 1..stale.len() {
            let mut data = stale[..cut].to_vec();
            data.extend_from_slice(&frame);
            let mut channel = open_with(vec![Bytes::from(data)]).await;

            let read = FrameReader::new()
                .read_frame(&mut channel, Duration::from_secs(1))
                .await;

            assert_eq!(read.ok(), Some(frame.clone()), "stale prefix of {} bytes", cut);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_checksum_is_not_returned() {
        let mut frame = search_reply();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        let mut channel = open_with(vec![frame.freeze()]).await;

        let result = FrameReader::new()
            .read_frame(&mut channel, Duration::from_millis(500))
            .await;

        assert!(matches!(result, Err(Error::Timeout { received: 0 })));
    }

    #[test]
    fn test_later_frame() {
        let frame = search_reply();
        let mut data = vec![0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x00, 0x20];
        assert_eq!(later_frame(&data), None);

        data.extend_from_slice(&frame);
        assert_eq!(later_frame(&data), Some(9));
        assert_eq!(later_frame(&frame), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frame_times_out() {
        let frame = search_reply();
        let mut channel = open_with(vec![frame.freeze().slice(..10)]).await;

        let result = FrameReader::new()
            .read_frame(&mut channel, Duration::from_millis(500))
            .await;

        assert!(matches!(result, Err(Error::Timeout { received: 10 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let mut channel = open_with(Vec::new()).await;

        let started = Instant::now();
        let result = FrameReader::new()
            .read_frame(&mut channel, Duration::from_millis(250))
            .await;

        assert!(matches!(result, Err(Error::Timeout { received: 0 })));
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_gives_no_sync() {
        let fragments = (0..10).map(|_| Bytes::from_static(&[0x00; 4])).collect();
        let mut channel = open_with(fragments).await;

        let result = FrameReader::new()
            .with_max_sync_attempts(3)
            .read_frame(&mut channel, Duration::from_secs(5))
            .await;

        match result {
            Err(Error::NoSync { discarded }) => assert!(discarded >= 12),
            other => panic!("Expected NoSync, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_closed() {
        let channel_frame = search_reply().freeze().slice(..5);
        let mut channel = open_with(vec![channel_frame]).await;
        channel.close_after_incoming();

        let result = FrameReader::new()
            .read_frame(&mut channel, Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_align() {
        let mut buf = BytesMut::from(&[0x00, 0x11, 0xEF, 0x01, 0x22][..]);
        assert_eq!(align(&mut buf), 2);
        assert_eq!(buf.as_ref(), &[0xEF, 0x01, 0x22]);

        let mut buf = BytesMut::from(&[0x00, 0x11, 0xEF][..]);
        assert_eq!(align(&mut buf), 2);
        assert_eq!(buf.as_ref(), &[0xEF]);

        let mut buf = BytesMut::from(&[0x00, 0x11][..]);
        assert_eq!(align(&mut buf), 2);
        assert!(buf.is_empty());
    }

    fn garbage() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..16)
            .prop_filter("garbage must not contain a header", |g| {
                !g.windows(2).any(|w| w == HEADER)
            })
    }

    /// Leading part of an acknowledgement from an earlier exchange
    fn stale_prefix() -> impl Strategy<Value = Vec<u8>> {
        let stale = prop_oneof![
            Just(Response::new(ConfirmationCode::NoFinger, Vec::new())),
            Just(Response::new(ConfirmationCode::Ok, vec![0x00, 0x05])),
            Just(Response::new(ConfirmationCode::NotFound, vec![0x00; 4])),
            Just(Response::new(ConfirmationCode::Ok, vec![0x00; 32])),
        ];
        (stale, any::<proptest::sample::Index>()).prop_map(|(stale, cut)| {
            let bytes = stale.encode();
            bytes[..1 + cut.index(bytes.len() - 1)].to_vec()
        })
    }

    proptest! {
        #[test]
        fn prop_resync_after_stale_prefix(
            prefix in stale_prefix(),
            payload in proptest::collection::vec(any::<u8>(), 0..8),
            split in any::<proptest::sample::Index>(),
        ) {
            let frame = Response::new(ConfirmationCode::Ok, payload).encode();
            prop_assume!(prefix.len() < frame.len());

            let mut data = prefix;
            data.extend_from_slice(&frame);
            let at = split.index(data.len());
            let (first, second) = data.split_at(at);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let read = runtime.block_on(async {
                let mut channel = MockChannel::silent();
                channel.open().await.unwrap();
                channel.push_incoming(Bytes::copy_from_slice(first));
                channel.push_incoming(Bytes::copy_from_slice(second));

                FrameReader::new()
                    .read_frame(&mut channel, Duration::from_secs(1))
                    .await
            }).unwrap();

            prop_assert_eq!(read, frame);
        }

        #[test]
        fn prop_resync_after_garbage(
            garbage in garbage(),
            payload in proptest::collection::vec(any::<u8>(), 0..8),
            split in any::<proptest::sample::Index>(),
        ) {
            let frame = Response::new(ConfirmationCode::Ok, payload).encode();
            let mut data = garbage.clone();
            data.extend_from_slice(&frame);

            // Deliver in two arbitrary pieces
            let at = split.index(data.len());
            let (first, second) = data.split_at(at);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let read = runtime.block_on(async {
                let mut channel = MockChannel::silent();
                channel.open().await.unwrap();
                channel.push_incoming(Bytes::copy_from_slice(first));
                channel.push_incoming(Bytes::copy_from_slice(second));

                FrameReader::new()
                    .read_frame(&mut channel, Duration::from_secs(1))
                    .await
            }).unwrap();

            prop_assert_eq!(
                Response::decode(&read).unwrap(),
                Response::decode(&frame).unwrap()
            );
        }
    }
}
