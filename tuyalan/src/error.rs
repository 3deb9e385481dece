//! High-level error types

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] tuyalan_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tuyalan_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] tuyalan_types::Error),

    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectionTimeout {
        addr: String,
        timeout: Duration,
    },

    #[error("Connection to {addr} failed: {reason}")]
    Connection {
        addr: String,
        reason: String,
    },

    #[error("Timed out waiting for response to sequence number {sequence}")]
    ResponseTimeout {
        sequence: u32,
    },

    #[error("Failed to send data to {addr}: {reason}")]
    SendFailed {
        addr: String,
        reason: String,
    },

    #[error("Device has been disabled")]
    Disabled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Check if the link should be torn down after this error
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ResponseTimeout { .. }
        )
    }

    /// Check if the error concerns a single bad frame
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_recoverable())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ResponseTimeout { .. }
        )
    }

    /// Check if the configured local key was rejected
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::Core(tuyalan_core::Error::InvalidKey { .. }))
    }

    /// Check if a model code has no command table
    pub fn is_unknown_model(&self) -> bool {
        matches!(self, Self::Types(tuyalan_types::Error::UnknownModel(_)))
    }
}
