//! Port definition for image caching.

use std::sync::Arc;

use crate::domain::entities::{Bitmap, CacheKey, TargetSize};
use crate::domain::errors::CacheResult;

use super::ByteStream;

/// Value handed to a cache tier.
///
/// The memory tier keeps decoded bitmaps, the disk tier keeps the encoded
/// bytes exactly as they arrived from the network.
pub enum CacheEntry {
    /// Decoded bitmap.
    Decoded(Arc<Bitmap>),
    /// Encoded body, consumed as it is written.
    Encoded(ByteStream),
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decoded(bitmap) => f
                .debug_tuple("Decoded")
                .field(&format_args!("{}x{}", bitmap.width(), bitmap.height()))
                .finish(),
            Self::Encoded(_) => f.write_str("Encoded(..)"),
        }
    }
}

/// Port for one cache tier, or a composition of tiers.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image decoded to cover `target`.
    /// Returns None if not cached.
    async fn get(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>>;

    /// Stores an entry. Entries of a kind the tier does not hold are ignored.
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()>;

    /// Reads back an entry just stored through [`Self::put`].
    ///
    /// Not a lookup, so hit and miss counters are left alone.
    async fn read_back(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        self.get(key, target).await
    }

    /// Returns true if encoded entries survive a restart.
    fn is_persistent(&self) -> bool;

    /// Short tier name for logs.
    fn tier(&self) -> &'static str;
}

/// Tier that never stores anything. Selected when the disk tier is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpImageCache;

#[async_trait::async_trait]
impl ImageCachePort for NoOpImageCache {
    async fn get(&self, _key: &CacheKey, _target: TargetSize) -> Option<Arc<Bitmap>> {
        None
    }

    async fn put(&self, _key: &CacheKey, _entry: CacheEntry) -> CacheResult<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn tier(&self) -> &'static str {
        "none"
    }
}
