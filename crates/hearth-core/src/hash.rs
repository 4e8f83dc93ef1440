//! Content digests for blob file names

use crate::{CoreError, Result};

/// Default digest length in hex characters (64 bits of BLAKE3 output).
///
/// Short names keep the blob tree readable. The trade-off is collision
/// resistance: 64 bits is a storage-density key, not a security primitive.
pub const DEFAULT_DIGEST_HEX_LEN: usize = 16;

const MIN_DIGEST_HEX_LEN: usize = 8;
const MAX_DIGEST_HEX_LEN: usize = 64;

/// Computes fixed-length lowercase hex digests over arbitrary bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    hex_len: usize,
}

impl ContentHasher {
    pub fn new(hex_len: usize) -> Result<Self> {
        if !(MIN_DIGEST_HEX_LEN..=MAX_DIGEST_HEX_LEN).contains(&hex_len) || hex_len % 2 != 0 {
            return Err(CoreError::InvalidDigestLength(hex_len));
        }
        Ok(Self { hex_len })
    }

    pub fn hex_len(&self) -> usize {
        self.hex_len
    }

    /// Digest of `bytes`, truncated to `hex_len` characters
    pub fn digest(&self, bytes: &[u8]) -> String {
        let hash = blake3::hash(bytes);
        let mut hex = hash.to_hex().to_string();
        hex.truncate(self.hex_len);
        hex
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            hex_len: DEFAULT_DIGEST_HEX_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_fixed_length_lowercase_hex() {
        let hasher = ContentHasher::default();
        let inputs: [&[u8]; 4] = [b"", b"a", b"hello world", &[0u8; 4096]];
        for input in inputs {
            let digest = hasher.digest(input);
            assert_eq!(digest.len(), DEFAULT_DIGEST_HEX_LEN);
            assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        let hasher = ContentHasher::default();
        assert_eq!(hasher.digest(b"same bytes"), hasher.digest(b"same bytes"));
        assert_ne!(hasher.digest(b"same bytes"), hasher.digest(b"other bytes"));
    }

    #[test]
    fn test_digest_is_prefix_of_full_hash() {
        let full = blake3::hash(b"prefix").to_hex().to_string();
        let digest = ContentHasher::new(32).unwrap().digest(b"prefix");
        assert_eq!(digest, full[..32]);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        assert_eq!(ContentHasher::new(6), Err(CoreError::InvalidDigestLength(6)));
        assert_eq!(ContentHasher::new(17), Err(CoreError::InvalidDigestLength(17)));
        assert_eq!(ContentHasher::new(66), Err(CoreError::InvalidDigestLength(66)));
        assert!(ContentHasher::new(64).is_ok());
    }
}
