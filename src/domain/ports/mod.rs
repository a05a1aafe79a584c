mod fetch_port;
mod image_cache_port;
mod resizer_port;
mod show_view_port;

pub use fetch_port::{ByteStream, FetchPort};
pub use image_cache_port::{CacheEntry, ImageCachePort, NoOpImageCache};
pub use resizer_port::{DecodeSource, ResizerPort};
pub use show_view_port::{ShowView, SinkRef};
