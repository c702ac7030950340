//! Hashing and checksum utilities

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Format a 32-byte hash as a hex string
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

/// Compute CRC32 checksum (for blob integrity)
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify CRC32 checksum
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_deterministic() {
        let data = b"calibration input";
        assert_eq!(sha256(data), sha256(data));
    }

    #[test]
    fn test_sha256_different_input() {
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }

    #[test]
    fn test_hash_to_hex_length() {
        assert_eq!(hash_to_hex(&sha256(b"x")).len(), 64);
    }

    #[test]
    fn test_crc32() {
        let data = b"engine blob";
        let checksum = crc32(data);
        assert!(verify_crc32(data, checksum));
        assert!(!verify_crc32(b"other", checksum));
    }
}
