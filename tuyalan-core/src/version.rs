//! Protocol version
//!
//! A session speaks exactly one version for its whole lifetime. Versions
//! below 3.3 use the legacy regime (base64 ciphertext with a keyed digest,
//! payload-only checksum); 3.3 and above use the versioned regime (raw
//! ciphertext, header-covering checksum).

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Protocol version as a `(major, minor)` pair
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const V3_1: Self = Self::new(3, 1);
    pub const V3_2: Self = Self::new(3, 2);
    pub const V3_3: Self = Self::new(3, 3);
    pub const V3_4: Self = Self::new(3, 4);

    /// Every version a session may be configured with
    pub const SUPPORTED: [Self; 4] = [Self::V3_1, Self::V3_2, Self::V3_3, Self::V3_4];

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version uses the legacy (pre-3.3) regime
    pub fn is_legacy(self) -> bool {
        self < Self::V3_3
    }

    /// Check if a session may be configured with this version
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Reject versions outside [`Self::SUPPORTED`]
    pub fn ensure_supported(self) -> Result<Self> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(Error::UnsupportedVersion(self.to_string()))
        }
    }

    /// Three ASCII bytes as they appear on the wire, e.g. `b"3.3"`
    pub fn as_bytes(self) -> [u8; 3] {
        [b'0' + self.major, b'.', b'0' + self.minor]
    }

    /// Parse the three-byte wire form
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => {
                Some(Self::new(major - b'0', minor - b'0'))
            }
            _ => None,
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V3_3
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| Error::UnsupportedVersion(s.to_string()))?;

        let major = major
            .parse()
            .map_err(|_| Error::UnsupportedVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| Error::UnsupportedVersion(s.to_string()))?;

        Self::new(major, minor).ensure_supported()
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> String {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!("3.3".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V3_3);
        assert_eq!("3.1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V3_1);
    }

    #[test]
    fn test_version_rejects_unknown() {
        assert!("3.5".parse::<ProtocolVersion>().is_err());
        assert!("2.2".parse::<ProtocolVersion>().is_err());
        assert!("three".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_version_regime_boundary() {
        assert!(ProtocolVersion::V3_1.is_legacy());
        assert!(ProtocolVersion::V3_2.is_legacy());
        assert!(!ProtocolVersion::V3_3.is_legacy());
        assert!(!ProtocolVersion::V3_4.is_legacy());
    }

    #[test]
    fn test_version_wire_form() {
        assert_eq!(&ProtocolVersion::V3_3.as_bytes(), b"3.3");
        assert_eq!(ProtocolVersion::from_wire(b"3.1abc"), Some(ProtocolVersion::V3_1));
        assert_eq!(ProtocolVersion::from_wire(&[0x12, 0x34, 0x56]), None);
        assert_eq!(ProtocolVersion::from_wire(b"3."), None);
    }
}
