//! Power-of-two downsampling decoder.

use std::io::{BufRead, BufReader, Cursor, Seek};

use image::imageops::FilterType;
use image::{ImageReader, Limits};
use tracing::trace;

use crate::domain::entities::{Bitmap, TargetSize};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{DecodeSource, ResizerPort};

/// Largest width or height accepted from a source image.
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// Largest full-resolution pixel buffer a decode may allocate (256 MiB).
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 256 * 1024 * 1024;

/// Decodes images reduced by the largest power-of-two factor that still
/// covers the requested size.
///
/// The first pass reads only the header to learn the dimensions; the second
/// decodes the pixels and reduces them by the computed factor. Both passes
/// refuse sources beyond the configured dimension and allocation limits, so
/// an oversized body fails before its pixels are allocated.
#[derive(Debug, Clone, Copy)]
pub struct Downsampler {
    max_dimension: u32,
    max_decode_bytes: u64,
}

impl Default for Downsampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Downsampler {
    /// Creates a downsampler with the default limits.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_DIMENSION, DEFAULT_MAX_DECODE_BYTES)
    }

    /// Creates a downsampler refusing sources wider or taller than
    /// `max_dimension`, or needing more than `max_decode_bytes` to decode.
    #[must_use]
    pub const fn with_limits(max_dimension: u32, max_decode_bytes: u64) -> Self {
        Self {
            max_dimension,
            max_decode_bytes,
        }
    }

    /// Computes the subsampling factor for a `width`x`height` source.
    ///
    /// Doubles from 1 while both halved dimensions divided by the factor stay
    /// strictly larger than the target. A zero target dimension disables
    /// resizing.
    #[must_use]
    pub const fn calculate_sample_size(width: u32, height: u32, target: TargetSize) -> u32 {
        if target.is_unbounded() {
            return 1;
        }

        let mut sample_size = 1;
        if height > target.height || width > target.width {
            let half_height = height / 2;
            let half_width = width / 2;
            while half_height / sample_size > target.height
                && half_width / sample_size > target.width
            {
                sample_size *= 2;
            }
        }
        sample_size
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_decode_bytes);
        limits
    }

    fn open<R: BufRead + Seek>(&self, reader: R) -> CacheResult<ImageReader<R>> {
        let mut reader = ImageReader::new(reader)
            .with_guessed_format()
            .map_err(|e| CacheError::io("failed to sniff image format", &e))?;
        reader.limits(self.limits());
        Ok(reader)
    }

    fn read_dimensions<R: BufRead + Seek>(&self, reader: R) -> CacheResult<(u32, u32)> {
        self.open(reader)?
            .into_dimensions()
            .map_err(|e| CacheError::Decode(format!("failed to read dimensions: {e}")))
    }

    fn decode_sampled<R: BufRead + Seek>(&self, reader: R, sample_size: u32) -> CacheResult<Bitmap> {
        let image = self
            .open(reader)?
            .decode()
            .map_err(|e| CacheError::Decode(format!("failed to decode image: {e}")))?;

        if sample_size == 1 {
            return Ok(Bitmap::new(image, 1));
        }

        let width = image.width().div_ceil(sample_size);
        let height = image.height().div_ceil(sample_size);
        let reduced = image.resize_exact(width, height, FilterType::Triangle);
        Ok(Bitmap::new(reduced, sample_size))
    }
}

impl ResizerPort for Downsampler {
    fn decode(&self, source: DecodeSource, target: TargetSize) -> CacheResult<Bitmap> {
        match source {
            DecodeSource::Bytes(bytes) => {
                let (width, height) = self.read_dimensions(Cursor::new(&bytes[..]))?;
                let sample_size = Self::calculate_sample_size(width, height, target);
                trace!(width, height, %target, sample_size, "Decoding from memory");
                self.decode_sampled(Cursor::new(&bytes[..]), sample_size)
            }
            DecodeSource::File(file) => {
                let mut reader = BufReader::new(file);
                reader
                    .rewind()
                    .map_err(|e| CacheError::io("failed to rewind cache file", &e))?;
                let (width, height) = self.read_dimensions(&mut reader)?;
                let sample_size = Self::calculate_sample_size(width, height, target);
                reader
                    .rewind()
                    .map_err(|e| CacheError::io("failed to rewind cache file", &e))?;
                trace!(width, height, %target, sample_size, "Decoding from file");
                self.decode_sampled(reader, sample_size)
            }
        }
    }
}
