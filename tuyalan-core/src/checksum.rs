//! Frame checksum
//!
//! Frames are protected by the IEEE CRC-32 (reflected polynomial
//! `0xEDB88320`, initial value and final XOR `0xFFFFFFFF`). Which bytes are
//! covered depends on the protocol version, see [`crate::Message`].

use tracing::trace;

/// Calculate the CRC-32 of `data`
///
/// # Examples
///
/// ```
/// use tuyalan_core::checksum;
///
/// assert_eq!(checksum::calculate(b"123456789"), 0xCBF4_3926);
/// ```
pub fn calculate(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    let checksum = hasher.finalize();

    trace!(
        len = data.len(),
        checksum = format!("0x{:08X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify checksum
pub fn verify(data: &[u8], expected: u32) -> bool {
    calculate(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(calculate(&[]), 0);
    }

    #[test]
    fn test_checksum_check_value() {
        // Standard CRC-32 check value
        assert_eq!(calculate(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_checksum_verify() {
        let data = [0x00, 0x00, 0x55, 0xAA, 0x01];
        let checksum = calculate(&data);

        assert!(verify(&data, checksum));
        assert!(!verify(&data, checksum.wrapping_add(1)));
    }

    #[test]
    fn test_checksum_single_bit_sensitive() {
        let data = vec![0x5Au8; 64];
        let original = calculate(&data);

        for i in 0..data.len() * 8 {
            let mut flipped = data.clone();
            flipped[i / 8] ^= 1 << (i % 8);
            assert_ne!(calculate(&flipped), original, "bit {i}");
        }
    }
}
