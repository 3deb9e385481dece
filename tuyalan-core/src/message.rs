//! Tuya local protocol frame encoding/decoding

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use serde_json::{Map, Value};
use std::fmt;

use crate::{
    checksum,
    cipher::Cipher,
    command::Command,
    constants::{MAGIC_PREFIX, MAGIC_SUFFIX},
    error::{Error, FrameError, Result},
};

/// Tuya local protocol message
///
/// # Frame Structure
///
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┐
/// │  Prefix  │ Sequence │ Command  │   Size   │ Payload  │ Checksum │  Suffix  │
/// │ 4 bytes  │ 4 bytes  │ 4 bytes  │ 4 bytes  │ N bytes  │ 4 bytes  │ 4 bytes  │
/// │ 0x55AA   │ (BE u32) │ (BE u32) │ (BE u32) │          │ (CRC-32) │ 0xAA55   │
/// └──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┘
/// ```
///
/// `Size` counts the payload plus the 8 trailing bytes. Frames sent by a
/// device may start their payload with a 4-byte status code; it is
/// recognised by its three high bytes being zero.
///
/// The checksum covers everything before it for versions 3.3 and up, and
/// only the payload region for legacy versions.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tuyalan_core::{Cipher, Command, Message, ProtocolVersion};
///
/// let cipher = Cipher::new("0123456789abcdef", ProtocolVersion::V3_3).unwrap();
/// let message = Message::with_payload(Command::Get, 42, json!({"devId": "abc"}));
///
/// let encoded = message.encode(&cipher, true).unwrap();
/// let decoded = Message::decode(&encoded, &cipher).unwrap();
///
/// assert_eq!(decoded.command, Command::Get);
/// assert_eq!(decoded.sequence, 42);
/// assert_eq!(decoded.payload, message.payload);
/// ```
#[derive(Clone, PartialEq)]
pub struct Message {
    /// Command code
    pub command: Command,

    /// Correlates a response with its request
    pub sequence: u32,

    /// Structured payload, `None` for an empty payload
    pub payload: Option<Value>,

    /// Status code embedded by the device, if any
    pub status: Option<u32>,
}

impl Message {
    /// Prefix, sequence, command and size
    pub const HEADER_SIZE: usize = 16;

    /// Checksum and suffix
    pub const TRAILER_SIZE: usize = 8;

    /// Optional status code following the header
    pub const STATUS_SIZE: usize = 4;

    /// Largest payload accepted in either direction
    pub const MAX_PAYLOAD_SIZE: usize = 0xFFFF;

    /// Create a message with empty payload
    pub fn new(command: Command, sequence: u32) -> Self {
        Self {
            command,
            sequence,
            payload: None,
            status: None,
        }
    }

    /// Create a message with payload
    pub fn with_payload(command: Command, sequence: u32, payload: Value) -> Self {
        Self {
            command,
            sequence,
            payload: Some(payload),
            status: None,
        }
    }

    /// Attach a status code, as a device does on its responses
    pub fn with_status(mut self, status: u32) -> Self {
        self.status = Some(status);
        self
    }

    /// Datapoint object carried under the `dps` key
    pub fn datapoints(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()?.get("dps")?.as_object()
    }

    /// Encode message to bytes
    ///
    /// The payload is serialized as compact JSON and, if `encrypt` is set,
    /// passed through the cipher. The checksum regime follows the cipher's
    /// protocol version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the encoded payload exceeds
    /// [`Self::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, cipher: &Cipher, encrypt: bool) -> Result<BytesMut> {
        let mut body = match &self.payload {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| Error::decode(format!("payload serialization failed: {e}")))?,
            None => Vec::new(),
        };

        if encrypt {
            body = cipher.encrypt(self.command, &body);
        }

        let status_len = if self.status.is_some() { Self::STATUS_SIZE } else { 0 };
        let payload_len = status_len + body.len();

        if payload_len > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload_len,
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(Self::HEADER_SIZE + payload_len + Self::TRAILER_SIZE);

        buf.put_u32(MAGIC_PREFIX);
        buf.put_u32(self.sequence);
        buf.put_u32(self.command.code());
        buf.put_u32((payload_len + Self::TRAILER_SIZE) as u32);
        if let Some(status) = self.status {
            buf.put_u32(status);
        }
        buf.put_slice(&body);

        let covered = if cipher.version().is_legacy() {
            &buf[Self::HEADER_SIZE..]
        } else {
            &buf[..]
        };
        let crc = checksum::calculate(covered);

        buf.put_u32(crc);
        buf.put_u32(MAGIC_SUFFIX);

        Ok(buf)
    }

    /// Decode a single frame
    ///
    /// Structural checks (prefix, size, suffix, checksum) all run before any
    /// payload byte reaches the cipher, so a garbled frame is always an
    /// [`Error::InvalidMessage`] and never a decryption attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMessage`] for framing or checksum failures
    /// - [`Error::MessageDecodeFailed`] if the payload does not decrypt,
    ///   is not UTF-8, or is not JSON
    pub fn decode(buf: &[u8], cipher: &Cipher) -> Result<Self> {
        let min = Self::HEADER_SIZE + Self::TRAILER_SIZE;
        if buf.len() < min {
            return Err(FrameError::TooShort {
                expected: min,
                actual: buf.len(),
            }
            .into());
        }

        let prefix = read_u32(buf, 0);
        if prefix != MAGIC_PREFIX {
            return Err(FrameError::BadPrefix(prefix).into());
        }

        let sequence = read_u32(buf, 4);
        let command = Command::from(read_u32(buf, 8));
        let declared = read_u32(buf, 12) as usize;

        if declared < Self::TRAILER_SIZE || Self::HEADER_SIZE + declared > buf.len() {
            return Err(FrameError::BadLength {
                declared,
                actual: buf.len(),
            }
            .into());
        }

        let end = Self::HEADER_SIZE + declared - Self::TRAILER_SIZE;

        let suffix = read_u32(buf, end + 4);
        if suffix != MAGIC_SUFFIX {
            return Err(FrameError::BadSuffix(suffix).into());
        }

        let covered = if cipher.version().is_legacy() {
            &buf[Self::HEADER_SIZE..end]
        } else {
            &buf[..end]
        };
        let expected = checksum::calculate(covered);
        let received = read_u32(buf, end);
        if expected != received {
            return Err(FrameError::ChecksumMismatch { expected, received }.into());
        }

        let mut body = &buf[Self::HEADER_SIZE..end];
        let mut status = None;
        if body.len() >= Self::STATUS_SIZE && read_u32(body, 0) >> 8 == 0 {
            status = Some(read_u32(body, 0));
            body = &body[Self::STATUS_SIZE..];
        }

        let payload = if body.is_empty() {
            None
        } else {
            Some(decode_payload(command, body, cipher)?)
        };

        Ok(Self {
            command,
            sequence,
            payload,
            status,
        })
    }

    /// Get total encoded size of a frame whose payload is `payload_len` bytes
    pub fn frame_size(payload_len: usize) -> usize {
        Self::HEADER_SIZE + payload_len + Self::TRAILER_SIZE
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    BigEndian::read_u32(&buf[offset..offset + 4])
}

fn decode_payload(command: Command, raw: &[u8], cipher: &Cipher) -> Result<Value> {
    // Legacy devices answer GET in cleartext
    if raw.first() == Some(&b'{') && raw.last() == Some(&b'}') {
        if let Ok(value) = serde_json::from_slice(raw) {
            return Ok(value);
        }
    }

    let plaintext = cipher.decrypt(command, raw)?;

    let text = String::from_utf8(plaintext).map_err(|e| {
        tracing::debug!(payload = %hex::encode(e.as_bytes()), "Payload is not UTF-8");
        Error::decode(format!("payload is not UTF-8: {}", e.utf8_error()))
    })?;

    serde_json::from_str(&text).map_err(|e| {
        tracing::debug!(payload = %text, "Payload is not JSON");
        Error::decode(format!("payload is not JSON: {e}"))
    })
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("command", &self.command)
            .field("sequence", &self.sequence)
            .field("status", &self.status)
            .field("payload", &self.payload)
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message[{}](seq={}", self.command, self.sequence)?;
        if let Some(status) = self.status {
            write!(f, ", status={status}")?;
        }
        match &self.payload {
            Some(payload) => write!(f, ", payload={payload})"),
            None => write!(f, ")"),
        }
    }
}
