//! Stream framing
//!
//! Splits the inbound byte stream into whole frames without interpreting
//! them. A frame is located by its magic prefix, sized by the header's
//! length field and accepted only when the magic suffix sits exactly where
//! the length says it should. Anything else is skipped one byte at a time
//! until the next plausible frame start, so a single garbled frame never
//! swallows the frames behind it.

use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use tuyalan_core::constants::{MAGIC_PREFIX, MAGIC_SUFFIX};
use tuyalan_core::{HEADER_SIZE, MAX_FRAME_SIZE, Message};

const PREFIX_BYTES: [u8; 4] = MAGIC_PREFIX.to_be_bytes();
const SUFFIX_BYTES: [u8; 4] = MAGIC_SUFFIX.to_be_bytes();

/// Splits a byte stream into raw frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE + Message::STATUS_SIZE,
        }
    }

    /// Cap the size of a single frame
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        loop {
            match find_prefix(src) {
                Some(0) => {}
                Some(offset) => {
                    debug!(skipped = offset, "Discarding bytes before frame prefix");
                    src.advance(offset);
                }
                None => {
                    // A prefix may be split across reads
                    let keep = src.len().min(PREFIX_BYTES.len() - 1);
                    let garbage = src.len() - keep;
                    if garbage > 0 {
                        debug!(skipped = garbage, "Discarding bytes without frame prefix");
                        src.advance(garbage);
                    }
                    return Ok(None);
                }
            }

            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let declared = BigEndian::read_u32(&src[12..16]) as usize;
            let total = HEADER_SIZE.saturating_add(declared);

            if declared < Message::TRAILER_SIZE || total > self.max_frame_size {
                debug!(declared, "Implausible frame length, resyncing");
                src.advance(1);
                continue;
            }

            if src.len() < total {
                // A frame boundary inside the declared span means the length lied
                if find_boundary(&src[HEADER_SIZE..]).is_some() {
                    debug!(
                        declared,
                        buffered = src.len(),
                        "Declared length overruns the next frame, resyncing"
                    );
                    src.advance(1);
                    continue;
                }

                src.reserve(total - src.len());
                return Ok(None);
            }

            let suffix = BigEndian::read_u32(&src[total - 4..total]);
            if suffix != MAGIC_SUFFIX {
                debug!(
                    declared,
                    suffix = format_args!("0x{suffix:08X}"),
                    "Frame suffix missing, resyncing"
                );
                src.advance(1);
                continue;
            }

            trace!(size = total, "Frame complete");
            return Ok(Some(src.split_to(total)));
        }
    }
}

fn find_prefix(buf: &[u8]) -> Option<usize> {
    buf.windows(PREFIX_BYTES.len())
        .position(|window| window == PREFIX_BYTES)
}

/// Position of a suffix immediately followed by a prefix
fn find_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(SUFFIX_BYTES.len() + PREFIX_BYTES.len())
        .position(|window| window[..4] == SUFFIX_BYTES && window[4..] == PREFIX_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    /// Build a structurally valid frame around an arbitrary body
    fn frame(seq: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC_PREFIX);
        buf.put_u32(seq);
        buf.put_u32(0x0A);
        buf.put_u32((body.len() + 8) as u32);
        buf.extend_from_slice(body);
        buf.put_u32(0);
        buf.put_u32(MAGIC_SUFFIX);
        buf.to_vec()
    }

    fn seq_of(frame: &[u8]) -> u32 {
        BigEndian::read_u32(&frame[4..8])
    }

    #[test]
    fn test_single_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&frame(7, b"hello")[..]);

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(seq_of(&out), 7);
        assert_eq!(out.len(), 16 + 5 + 8);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = FrameCodec::new();
        let full = frame(1, b"abcdef");

        let mut buf = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&full[10..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut codec = FrameCodec::new();
        let mut bytes = frame(1, b"one");
        bytes.extend(frame(2, b"two"));
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 1);
        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_leading_garbage_skipped() {
        let mut codec = FrameCodec::new();
        let mut bytes = vec![0xde, 0xad, 0xbe, 0xef, 0x00];
        bytes.extend(frame(3, b"x"));
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 3);
    }

    #[test]
    fn test_split_prefix_retained() {
        let mut codec = FrameCodec::new();
        let full = frame(4, b"x");

        let mut buf = BytesMut::from(&[0xffu8, 0xff, 0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[0xff, 0x00, 0x00]);

        buf.extend_from_slice(&full[2..]);
        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 4);
    }

    #[test]
    fn test_missing_suffix_then_valid_frame() {
        let mut codec = FrameCodec::new();

        let mut broken = frame(10, b"{\"dps\":{}}");
        broken.truncate(broken.len() - 4);
        let mut bytes = broken;
        bytes.extend(frame(11, b"{\"dps\":{\"1\":true}}"));
        let mut buf = BytesMut::from(&bytes[..]);

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(seq_of(&out), 11);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_implausible_length_resyncs() {
        let mut codec = FrameCodec::new().with_max_frame_size(64);

        let mut bogus = BytesMut::new();
        bogus.put_u32(MAGIC_PREFIX);
        bogus.put_u32(0);
        bogus.put_u32(0x0A);
        bogus.put_u32(0x00FF_FFFF);
        let mut bytes = bogus.to_vec();
        bytes.extend(frame(5, b"ok"));
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 5);
    }

    #[test]
    fn test_length_below_trailer_resyncs() {
        let mut codec = FrameCodec::new();

        let mut bogus = BytesMut::new();
        bogus.put_u32(MAGIC_PREFIX);
        bogus.put_u32(0);
        bogus.put_u32(0x0A);
        bogus.put_u32(4);
        let mut bytes = bogus.to_vec();
        bytes.extend(frame(6, b""));
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(seq_of(&codec.decode(&mut buf).unwrap().unwrap()), 6);
    }

    #[test]
    fn test_overlong_length_does_not_withhold_next_frame() {
        let mut codec = FrameCodec::new();

        // Claims 400 bytes but ends after 10
        let mut liar = frame(1, b"0123456789");
        liar[12..16].copy_from_slice(&400u32.to_be_bytes());
        let mut bytes = liar;
        bytes.extend(frame(2, b"{\"dps\":{}}"));
        let mut buf = BytesMut::from(&bytes[..]);

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(seq_of(&out), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_frame_still_waits() {
        let mut codec = FrameCodec::new();
        let full = frame(3, &[0x5A; 200]);

        let mut buf = BytesMut::from(&full[..100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 100);
    }
}
