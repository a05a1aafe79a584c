//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Bitmap, CacheKey, ImageSource, LoadRequest, LoadedImage, TargetSize};
pub use errors::{CacheError, CacheResult};
pub use ports::{FetchPort, ImageCachePort, ResizerPort, ShowView, SinkRef};
