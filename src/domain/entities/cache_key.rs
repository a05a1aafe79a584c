//! Cache key derived from an image URL.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a key (128 bits, 32 hex chars).
const KEY_DIGEST_BYTES: usize = 16;

/// Deterministic identifier addressing both cache tiers.
///
/// Derived from a SHA-256 digest of the source URL, so the same URL maps to
/// the same key across process restarts and the key is safe to use as a
/// file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..KEY_DIGEST_BYTES]))
    }

    /// Wraps an already-derived hex digest, e.g. one read back from the disk journal.
    ///
    /// Returns `None` unless the input looks like a key produced by [`Self::from_url`].
    #[must_use]
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let valid = hex_digest.len() == KEY_DIGEST_BYTES * 2
            && hex_digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex_digest.to_string()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
