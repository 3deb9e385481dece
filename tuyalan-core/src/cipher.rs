//! Payload encryption
//!
//! Payloads are AES-128-ECB with PKCS#7 padding under the device's local key.
//! The framing around the ciphertext depends on the protocol version.
//!
//! # Legacy regime (< 3.3)
//!
//! ```text
//! ┌────────────┬─────────────────┬──────────────────────┐
//! │  Version   │     Digest      │  base64(ciphertext)  │
//! │  3 bytes   │ 16 hex chars    │       N bytes        │
//! └────────────┴─────────────────┴──────────────────────┘
//! ```
//!
//! The digest is characters 8..24 of the hex MD5 of
//! `data=<base64>||lpv=<version>||<key>`.
//!
//! # Versioned regime (>= 3.3)
//!
//! ```text
//! ┌────────────┬─────────────────┬──────────────────────┐
//! │  Version   │      Zeros      │      ciphertext      │
//! │  3 bytes   │    12 bytes     │       N bytes        │
//! └────────────┴─────────────────┴──────────────────────┘
//! ```
//!
//! The 15-byte header is only present for [`Command::Set`] and
//! [`Command::GratuitousUpdate`]; every other command carries bare
//! ciphertext.

use std::fmt;

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use tracing::trace;

use crate::{
    command::Command,
    error::{Error, Result},
    version::ProtocolVersion,
};

/// Version-aware payload cipher
///
/// Stateless apart from its key and version; cloning is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct Cipher {
    key: [u8; Self::KEY_SIZE],
    version: ProtocolVersion,
}

impl Cipher {
    /// Local key length
    pub const KEY_SIZE: usize = 16;

    /// AES block length
    pub const BLOCK_SIZE: usize = 16;

    /// Version bytes plus digest
    pub const LEGACY_PREFIX_SIZE: usize = 19;

    /// Version bytes plus zero padding
    pub const VERSIONED_PREFIX_SIZE: usize = 15;

    const DIGEST_LEN: usize = 16;

    /// Create a cipher for a local key and protocol version
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKey`] if the key is not exactly 16 bytes
    /// - [`Error::UnsupportedVersion`] for versions outside 3.1–3.4
    ///
    /// # Examples
    ///
    /// ```
    /// use tuyalan_core::{Cipher, ProtocolVersion};
    ///
    /// assert!(Cipher::new("0123456789abcdef", ProtocolVersion::V3_3).is_ok());
    /// assert!(Cipher::new("0123456789abcde", ProtocolVersion::V3_3).is_err());
    /// ```
    pub fn new(key: impl AsRef<[u8]>, version: ProtocolVersion) -> Result<Self> {
        let key: [u8; Self::KEY_SIZE] = key
            .as_ref()
            .try_into()
            .map_err(|_| Error::InvalidKey {
                actual: key.as_ref().len(),
            })?;

        Ok(Self {
            key,
            version: version.ensure_supported()?,
        })
    }

    /// Protocol version this cipher frames for
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Encrypt `data` for a message carrying `command`
    ///
    /// Empty input produces empty ciphertext (plus the regime's header where
    /// one applies).
    pub fn encrypt(&self, command: Command, data: &[u8]) -> Vec<u8> {
        let ciphertext = if data.is_empty() {
            Vec::new()
        } else {
            self.encrypt_blocks(pad(data))
        };

        let mut out = Vec::with_capacity(Self::LEGACY_PREFIX_SIZE + ciphertext.len() * 2);

        if self.version.is_legacy() {
            let encoded = STANDARD.encode(&ciphertext);
            out.extend_from_slice(&self.version.as_bytes());
            out.extend_from_slice(self.digest(encoded.as_bytes()).as_bytes());
            out.extend_from_slice(encoded.as_bytes());
        } else {
            if command.has_version_header() {
                out.extend_from_slice(&self.version.as_bytes());
                out.extend_from_slice(&[0u8; Self::VERSIONED_PREFIX_SIZE - 3]);
            }
            out.extend_from_slice(&ciphertext);
        }

        trace!(
            command = %command,
            plaintext_len = data.len(),
            encrypted_len = out.len(),
            "Encrypted payload"
        );

        out
    }

    /// Decrypt a payload received with `command`
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageDecodeFailed`] if the ciphertext is not a whole
    /// number of blocks, is not valid base64 (legacy), or its padding does
    /// not verify. A wrong key almost always surfaces as a padding failure.
    pub fn decrypt(&self, command: Command, data: &[u8]) -> Result<Vec<u8>> {
        let body = &data[self.prefix_size(command, data)..];

        let ciphertext = if self.version.is_legacy() {
            STANDARD
                .decode(body)
                .map_err(|e| Error::decode(format!("invalid base64: {e}")))?
        } else {
            body.to_vec()
        };

        if ciphertext.is_empty() {
            return Ok(ciphertext);
        }

        if ciphertext.len() % Self::BLOCK_SIZE != 0 {
            return Err(Error::decode(format!(
                "ciphertext length {} is not a multiple of {}",
                ciphertext.len(),
                Self::BLOCK_SIZE
            )));
        }

        let plaintext = unpad(self.decrypt_blocks(ciphertext))?;

        trace!(
            command = %command,
            plaintext_len = plaintext.len(),
            "Decrypted payload"
        );

        Ok(plaintext)
    }

    /// Length of the regime header present at the start of `data`
    ///
    /// Returns 0 when the header is absent, names a different version, or
    /// (legacy) carries a digest that does not match this key.
    pub fn prefix_size(&self, command: Command, data: &[u8]) -> usize {
        if ProtocolVersion::from_wire(data) != Some(self.version) {
            return 0;
        }

        if self.version.is_legacy() {
            if data.len() < Self::LEGACY_PREFIX_SIZE {
                return 0;
            }

            let expected = self.digest(&data[Self::LEGACY_PREFIX_SIZE..]);
            if &data[3..Self::LEGACY_PREFIX_SIZE] != expected.as_bytes() {
                return 0;
            }

            Self::LEGACY_PREFIX_SIZE
        } else if command.has_version_header() && data.len() >= Self::VERSIONED_PREFIX_SIZE {
            Self::VERSIONED_PREFIX_SIZE
        } else {
            0
        }
    }

    /// Keyed digest used by the legacy regime
    fn digest(&self, encoded: &[u8]) -> String {
        let input = format!(
            "data={}||lpv={}||{}",
            String::from_utf8_lossy(encoded),
            self.version,
            String::from_utf8_lossy(&self.key)
        );

        let hash = hex::encode(Md5::digest(input.as_bytes()));
        hash[8..8 + Self::DIGEST_LEN].to_string()
    }

    fn encrypt_blocks(&self, mut buf: Vec<u8>) -> Vec<u8> {
        let aes = Aes128::new(GenericArray::from_slice(&self.key));

        for block in buf.chunks_exact_mut(Self::BLOCK_SIZE) {
            aes.encrypt_block(GenericArray::from_mut_slice(block));
        }

        buf
    }

    fn decrypt_blocks(&self, mut buf: Vec<u8>) -> Vec<u8> {
        let aes = Aes128::new(GenericArray::from_slice(&self.key));

        for block in buf.chunks_exact_mut(Self::BLOCK_SIZE) {
            aes.decrypt_block(GenericArray::from_mut_slice(block));
        }

        buf
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("key", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

/// PKCS#7 pad to a whole number of blocks
fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = Cipher::BLOCK_SIZE - data.len() % Cipher::BLOCK_SIZE;
    let mut buf = Vec::with_capacity(data.len() + pad_len);
    buf.extend_from_slice(data);
    buf.resize(data.len() + pad_len, pad_len as u8);
    buf
}

/// Strip PKCS#7 padding, rejecting anything malformed
fn unpad(mut buf: Vec<u8>) -> Result<Vec<u8>> {
    let pad_len = match buf.last() {
        Some(&n) if (1..=Cipher::BLOCK_SIZE as u8).contains(&n) => n as usize,
        _ => return Err(Error::decode("invalid padding")),
    };

    if pad_len > buf.len() || !buf[buf.len() - pad_len..].iter().all(|&b| b as usize == pad_len) {
        return Err(Error::decode("invalid padding"));
    }

    buf.truncate(buf.len() - pad_len);
    Ok(buf)
}
