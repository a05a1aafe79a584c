//! Memory tier in front of a persistent tier.

use std::sync::Arc;

use tracing::trace;

use crate::domain::entities::{Bitmap, CacheKey, ImageSource, TargetSize};
use crate::domain::errors::CacheResult;
use crate::domain::ports::{CacheEntry, ImageCachePort};

use super::memory_cache::MemoryImageCache;

/// Looks up memory first, then the backing tier, back-filling memory on a
/// backing hit.
#[derive(Clone)]
pub struct TieredImageCache {
    memory: Arc<MemoryImageCache>,
    backing: Arc<dyn ImageCachePort>,
}

impl TieredImageCache {
    /// Composes `memory` over `backing`.
    #[must_use]
    pub fn new(memory: Arc<MemoryImageCache>, backing: Arc<dyn ImageCachePort>) -> Self {
        Self { memory, backing }
    }

    /// Finds `key` in either tier and reports which one answered.
    pub async fn lookup(
        &self,
        key: &CacheKey,
        target: TargetSize,
    ) -> Option<(Arc<Bitmap>, ImageSource)> {
        if let Some(bitmap) = self.memory.get(key) {
            return Some((bitmap, ImageSource::MemoryCache));
        }

        let bitmap = self.backing.get(key, target).await?;
        trace!(key = %key, tier = self.backing.tier(), "Back-filling memory cache");
        self.memory.insert(key, bitmap.clone());
        Some((bitmap, ImageSource::DiskCache))
    }

    /// Memory tier.
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryImageCache> {
        &self.memory
    }
}

#[async_trait::async_trait]
impl ImageCachePort for TieredImageCache {
    async fn get(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        self.lookup(key, target).await.map(|(bitmap, _)| bitmap)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()> {
        match entry {
            CacheEntry::Decoded(bitmap) => {
                self.memory.insert(key, bitmap);
                Ok(())
            }
            encoded @ CacheEntry::Encoded(_) => self.backing.put(key, encoded).await,
        }
    }

    /// Reads only the backing tier, then fills memory with the result.
    async fn read_back(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        let bitmap = self.backing.read_back(key, target).await?;
        self.memory.insert(key, bitmap.clone());
        Some(bitmap)
    }

    fn is_persistent(&self) -> bool {
        self.backing.is_persistent()
    }

    fn tier(&self) -> &'static str {
        "tiered"
    }
}
