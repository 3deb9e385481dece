//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection timeout after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Check if the peer tore the connection down
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset | Self::ConnectionClosed)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Self::ConnectionReset,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(e),
        }
    }
}
