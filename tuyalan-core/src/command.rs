//! Tuya local protocol command codes

use std::fmt;

/// Protocol command codes
///
/// Only the codes a session acts on have their own variant. Anything else
/// a device sends is carried as [`Command::Other`] and routed (or dropped)
/// by the session, never rejected by the codec.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Write a partial datapoint mapping (`CONTROL`)
    Set,

    /// Unsolicited state push from the device (`STATUS`)
    GratuitousUpdate,

    /// Keepalive request and its acknowledgement (`HEART_BEAT`)
    Ping,

    /// Poll the full datapoint mapping (`DP_QUERY`)
    Get,

    /// Any other code
    Other(u32),
}

impl Command {
    pub const SET: u32 = 0x07;
    pub const GRATUITOUS_UPDATE: u32 = 0x08;
    pub const PING: u32 = 0x09;
    pub const GET: u32 = 0x0A;

    /// Numeric wire code
    pub fn code(self) -> u32 {
        match self {
            Self::Set => Self::SET,
            Self::GratuitousUpdate => Self::GRATUITOUS_UPDATE,
            Self::Ping => Self::PING,
            Self::Get => Self::GET,
            Self::Other(code) => code,
        }
    }

    /// Check if payloads of this command carry the 15-byte version header
    /// under the versioned (3.3+) regime
    pub fn has_version_header(self) -> bool {
        matches!(self, Self::Set | Self::GratuitousUpdate)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Set => "CONTROL",
            Self::GratuitousUpdate => "STATUS",
            Self::Ping => "HEART_BEAT",
            Self::Get => "DP_QUERY",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

impl From<Command> for u32 {
    fn from(cmd: Command) -> u32 {
        cmd.code()
    }
}

impl From<u32> for Command {
    fn from(value: u32) -> Self {
        match value {
            Self::SET => Self::Set,
            Self::GRATUITOUS_UPDATE => Self::GratuitousUpdate,
            Self::PING => Self::Ping,
            Self::GET => Self::Get,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.code())
    }
}
