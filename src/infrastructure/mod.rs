//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, loading, delivery).
pub mod image;
/// Listing page fetch and URL extraction.
pub mod listing;
/// Host resource probes.
pub mod system;

pub use config::{AppConfig, BrowseConfig, CliArgs, ImageLoaderConfig, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskImageCache, ImageLoader, MemoryImageCache, RequestOutcome, UiContext,
};
pub use listing::{ListingClient, extract_image_urls};
