//! Domain entity definitions.

mod cache_key;
mod image;
mod request;

pub use cache_key::CacheKey;
pub use image::{Bitmap, ImageSource, LoadedImage, TargetSize};
pub use request::{LoadRequest, RequestState};
