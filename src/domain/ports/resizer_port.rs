//! Port for decoding and downsampling encoded images.

use bytes::Bytes;

use crate::domain::entities::{Bitmap, TargetSize};
use crate::domain::errors::CacheResult;

/// Encoded image input.
#[derive(Debug)]
pub enum DecodeSource {
    /// Encoded bytes held in memory.
    Bytes(Bytes),
    /// An open file positioned anywhere; decoders rewind it as needed.
    File(std::fs::File),
}

/// Decodes encoded image data at a size suited to a display target.
///
/// Implementations are CPU-bound and blocking; call them from a blocking
/// context, never from the UI thread or directly on an async executor.
pub trait ResizerPort: Send + Sync {
    /// Decodes `source` so the result still covers `target`.
    ///
    /// # Errors
    /// Returns `CacheError::Decode` if the data is not a recognised image.
    fn decode(&self, source: DecodeSource, target: TargetSize) -> CacheResult<Bitmap>;
}
