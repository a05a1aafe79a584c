//! Domain types for decoded images.

use std::sync::Arc;

use super::CacheKey;

/// Requested display size. A zero dimension means "do not downsample".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetSize {
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Creates a new target size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Target that keeps the source resolution.
    #[must_use]
    pub const fn original() -> Self {
        Self::new(0, 0)
    }

    /// Returns true if either dimension is zero.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded, possibly subsampled image.
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: image::DynamicImage,
    sample_size: u32,
}

impl Bitmap {
    /// Wraps a decoded image together with the subsampling factor used to produce it.
    #[must_use]
    pub fn new(image: image::DynamicImage, sample_size: u32) -> Self {
        Self {
            image,
            sample_size: sample_size.max(1),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Power-of-two factor the source was reduced by.
    #[must_use]
    pub const fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// Bytes per pixel row.
    #[must_use]
    pub fn row_bytes(&self) -> u64 {
        u64::from(self.image.width()) * u64::from(self.image.color().bytes_per_pixel())
    }

    /// Approximate decoded size, `row_bytes * height`.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.row_bytes() * u64::from(self.image.height())
    }

    /// Borrows the decoded pixels.
    #[must_use]
    pub const fn as_image(&self) -> &image::DynamicImage {
        &self.image
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from in-memory LRU cache.
    MemoryCache,
    /// Loaded from disk cache.
    DiskCache,
    /// Downloaded from network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully loaded image and the tier that served it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Key the image was requested under.
    pub key: CacheKey,
    /// Decoded bitmap, shared with the memory cache.
    pub bitmap: Arc<Bitmap>,
    /// Tier that produced the bitmap.
    pub source: ImageSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_byte_size_uses_row_bytes() {
        let bitmap = Bitmap::new(image::DynamicImage::new_rgba8(10, 4), 1);
        assert_eq!(bitmap.row_bytes(), 40);
        assert_eq!(bitmap.byte_size(), 160);

        let rgb = Bitmap::new(image::DynamicImage::new_rgb8(10, 4), 2);
        assert_eq!(rgb.byte_size(), 120);
        assert_eq!(rgb.sample_size(), 2);
    }

    #[test]
    fn test_sample_size_never_zero() {
        let bitmap = Bitmap::new(image::DynamicImage::new_luma8(1, 1), 0);
        assert_eq!(bitmap.sample_size(), 1);
    }

    #[test]
    fn test_target_size_unbounded() {
        assert!(TargetSize::original().is_unbounded());
        assert!(TargetSize::new(0, 150).is_unbounded());
        assert!(!TargetSize::new(120, 150).is_unbounded());
    }

    #[test]
    fn test_image_source_display() {
        assert_eq!(ImageSource::MemoryCache.to_string(), "memory");
        assert_eq!(ImageSource::DiskCache.to_string(), "disk");
        assert_eq!(ImageSource::Network.to_string(), "network");
    }
}
