//! Content hashing for transactions and blocks.
//!
//! Every digest is SHA-256 over a fixed byte stream, rendered as 64 lowercase
//! hex characters. The stream is built field by field:
//!
//! * `u64` / `i64` - 8 bytes, little-endian
//! * `f64` - the IEEE-754 bit pattern, 8 bytes, little-endian
//! * string - its byte length as a `u64`, then the UTF-8 bytes
//! * sequence - its element count as a `u64`, then every element
//!
//! Transactions hash `id, product_id, buyer_address, seller_address, amount,
//! timestamp`. Blocks hash `index, timestamp, transactions, previous_hash,
//! nonce`, where each transaction is written as its own fields followed by
//! its stored hash string.

use sha2::{Digest, Sha256};

/// Length of a hex encoded digest
pub const HASH_HEX_LEN: usize = 64;

/// Incremental writer for the canonical hashing stream
#[derive(Clone)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher {
            inner: Sha256::new(),
        }
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.inner.update(value.to_bits().to_le_bytes());
        self
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_u64(value.len() as u64);
        self.inner.update(value.as_bytes());
        self
    }

    /// Writes the element count that prefixes a sequence
    pub fn put_len(&mut self, len: usize) -> &mut Self {
        self.put_u64(len as u64)
    }

    /// Consumes the writer and returns the hex digest
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the difficulty predicate: at least `difficulty` leading `'0'` hex digits
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stream_is_sha256_of_nothing() {
        let hash = ContentHasher::new().finish();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash.len(), HASH_HEX_LEN);
    }

    #[test]
    fn test_strings_are_length_prefixed() {
        let mut joined = ContentHasher::new();
        joined.put_str("ab").put_str("c");

        let mut shifted = ContentHasher::new();
        shifted.put_str("a").put_str("bc");

        assert_ne!(joined.finish(), shifted.finish());
    }

    #[test]
    fn test_same_fields_same_digest() {
        let digest = || {
            let mut hasher = ContentHasher::new();
            hasher.put_u64(7).put_i64(-3).put_f64(2.5).put_str("tx");
            hasher.finish()
        };

        assert_eq!(digest(), digest());
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("00", 3));
    }
}
