//! Cache and load error types.

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while loading or caching an image.
///
/// None of these reach the UI collaborator: a failed load is simply an
/// image that never appears.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Disk tier could not be initialised or is disabled.
    #[error("disk cache unavailable: {0}")]
    DiskUnavailable(String),
    /// Connect, status or transfer failure.
    #[error("network error: {0}")]
    Network(String),
    /// URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Staged write aborted before commit.
    #[error("partial write aborted: {0}")]
    PartialWrite(String),
    /// Another writer holds the entry.
    #[error("entry {0} is already being written")]
    EditInProgress(String),
    /// Failed to decode image.
    #[error("decode error: {0}")]
    Decode(String),
    /// I/O error during cache operation.
    #[error("io error: {0}")]
    Io(String),
}

impl CacheError {
    /// Creates an I/O error with context.
    #[must_use]
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }

    /// Returns whether error originated from the network tier.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::InvalidUrl(_))
    }
}
