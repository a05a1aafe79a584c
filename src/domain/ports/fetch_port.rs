//! Port for fetching encoded images from their source.

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::errors::CacheResult;

/// Streamed response body. Dropping it releases the underlying connection.
pub type ByteStream = BoxStream<'static, CacheResult<Bytes>>;

/// Port for one-shot network fetches.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FetchPort: Send + Sync {
    /// Opens `url` and returns its body as a stream.
    ///
    /// Single attempt; callers decide whether to retry.
    async fn fetch(&self, url: &str) -> CacheResult<ByteStream>;
}
