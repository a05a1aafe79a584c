//! Memory -> disk -> network resolution for a single request.

use std::sync::Arc;

use bytes::BytesMut;
use futures_util::TryStreamExt;
use tracing::debug;

use crate::domain::entities::{Bitmap, LoadRequest, LoadedImage, ImageSource, TargetSize};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ByteStream, CacheEntry, DecodeSource, FetchPort, ImageCachePort, ResizerPort};

use super::tiered_cache::TieredImageCache;

/// Resolves one request through the cache tiers, falling back to the network.
pub struct FetchPipeline {
    cache: TieredImageCache,
    fetcher: Arc<dyn FetchPort>,
    resizer: Arc<dyn ResizerPort>,
}

impl FetchPipeline {
    #[must_use]
    pub fn new(
        cache: TieredImageCache,
        fetcher: Arc<dyn FetchPort>,
        resizer: Arc<dyn ResizerPort>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            resizer,
        }
    }

    /// Loads the image for `request`.
    ///
    /// A network body goes to the persistent tier first and is decoded back
    /// from there. Without a persistent tier the body is buffered and decoded
    /// directly. Either way the bitmap ends up in the memory tier.
    ///
    /// # Errors
    /// Network, disk write and decode failures; nothing is cached on failure.
    pub async fn load(&self, request: &LoadRequest) -> CacheResult<LoadedImage> {
        let key = &request.key;
        if let Some((bitmap, source)) = self.cache.lookup(key, request.target).await {
            return Ok(LoadedImage {
                key: key.clone(),
                bitmap,
                source,
            });
        }

        debug!(key = %key, url = %request.url, "Downloading image from network");
        let body = self.fetcher.fetch(&request.url).await?;

        let bitmap = if self.cache.is_persistent() {
            self.cache.put(key, CacheEntry::Encoded(body)).await?;
            self.cache
                .read_back(key, request.target)
                .await
                .ok_or_else(|| CacheError::Decode(format!("{key}: stored body is not readable")))?
        } else {
            let bitmap = Arc::new(self.decode_in_memory(body, request.target).await?);
            self.cache.put(key, CacheEntry::Decoded(bitmap.clone())).await?;
            bitmap
        };

        Ok(LoadedImage {
            key: key.clone(),
            bitmap,
            source: ImageSource::Network,
        })
    }

    async fn decode_in_memory(&self, body: ByteStream, target: TargetSize) -> CacheResult<Bitmap> {
        let bytes = body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?
            .freeze();

        let resizer = self.resizer.clone();
        tokio::task::spawn_blocking(move || resizer.decode(DecodeSource::Bytes(bytes), target))
            .await
            .map_err(|e| CacheError::Decode(format!("decode task panicked: {e}")))?
    }

    /// Cache tiers this pipeline reads and fills.
    #[must_use]
    pub const fn cache(&self) -> &TieredImageCache {
        &self.cache
    }
}
