//! # tuyalan-core
//!
//! Core protocol implementation for Tuya local-network devices.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - CRC-32 checksum calculation
//! - Payload encryption for the legacy and versioned regimes
//! - Command definitions
//! - Session state, sequence numbers and send backoff
//! - Protocol constants

pub mod checksum;
pub mod cipher;
pub mod command;
pub mod constants;
pub mod error;
pub mod message;
pub mod scheduler;
pub mod session;
pub mod version;

pub use cipher::Cipher;
pub use command::Command;
pub use error::{Error, FrameError, Result};
pub use message::Message;
pub use scheduler::Backoff;
pub use session::{LinkState, Liveness, Session};
pub use version::ProtocolVersion;

/// Default device port
pub const DEFAULT_PORT: u16 = 6668;

/// Frame header size
pub const HEADER_SIZE: usize = Message::HEADER_SIZE;

/// Largest frame accepted from the wire
pub const MAX_FRAME_SIZE: usize = Message::HEADER_SIZE + Message::MAX_PAYLOAD_SIZE + Message::TRAILER_SIZE;
