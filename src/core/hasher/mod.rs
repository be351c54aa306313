//! # Hasher Module
//!
//! Computes the content hash used as the cache key.
//!
//! ## How It Works
//! The raw upload bytes (not the decoded pixels) are hashed with XXH3-128.
//! Identical bytes always produce the same key; re-encoding the same
//! picture produces a different one. This is a cache key, not a security
//! boundary, so a fast non-cryptographic digest is enough.
//!
//! ## Example
//! ```rust,ignore
//! use image_denoiser::core::hasher::hash_of;
//!
//! let hash = hash_of(&bytes);
//! println!("{}", hash.to_hex());
//! ```

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

/// 128-bit digest of an upload's raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Create a hash from raw digest bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Get the hash as a 32-character lowercase hexadecimal string
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse a hash back from its hexadecimal form
    ///
    /// Returns `None` for anything that is not exactly 32 hex digits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }

        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Compute the content hash of raw upload bytes
pub fn hash_of(bytes: &[u8]) -> ContentHash {
    ContentHash(xxh3_128(bytes).to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_identically() {
        let a = hash_of(b"the same upload");
        let b = hash_of(b"the same upload");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(hash_of(b"upload one"), hash_of(b"upload two"));
    }

    #[test]
    fn hex_is_32_lowercase_chars() {
        let hex = hash_of(b"abc").to_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hex_parses_back() {
        let hash = hash_of(b"round trip me");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(ContentHash::from_hex("not-a-hash").is_none());
        assert!(ContentHash::from_hex(&"zz".repeat(16)).is_none());
        assert!(ContentHash::from_hex("abcd").is_none());
    }

    #[test]
    fn empty_input_has_a_hash() {
        assert_eq!(hash_of(b""), hash_of(&[]));
    }
}
