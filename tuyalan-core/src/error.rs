//! Error types for tuyalan-core

/// Result type alias for tuyalan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local key has the wrong length
    #[error("Invalid local key: expected 16 bytes, got {actual} bytes")]
    InvalidKey {
        actual: usize,
    },

    /// Protocol version outside the supported range
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// Frame failed structural validation
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] FrameError),

    /// Frame was intact but its payload could not be decrypted or parsed
    #[error("Message decode failed: {0}")]
    MessageDecodeFailed(String),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },
}

/// Reasons a frame is rejected before its payload is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Frame is shorter than its fixed layout
    #[error("frame too short: expected at least {expected} bytes, got {actual} bytes")]
    TooShort {
        expected: usize,
        actual: usize,
    },

    /// Magic prefix missing
    #[error("magic prefix missing (found 0x{0:08X})")]
    BadPrefix(u32),

    /// Magic suffix missing
    #[error("magic suffix missing (found 0x{0:08X})")]
    BadSuffix(u32),

    /// Declared payload size is inconsistent with the frame
    #[error("declared payload size {declared} does not fit a {actual}-byte frame")]
    BadLength {
        declared: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("checksum mismatch: expected 0x{expected:08X}, received 0x{received:08X}")]
    ChecksumMismatch {
        expected: u32,
        received: u32,
    },
}

impl Error {
    /// Check if the error concerns a garbled frame rather than its contents
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::InvalidMessage(_))
    }

    /// Check if the error concerns only the offending frame
    ///
    /// The connection that delivered such a frame stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessage(_) | Self::MessageDecodeFailed(_)
        )
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::MessageDecodeFailed(reason.into())
    }
}
