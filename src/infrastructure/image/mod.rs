//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction by decoded size
//! - Journaled disk caching for persistence
//! - Downsampled decoding
//! - Request de-duplication and LIFO scheduling
//! - Delivery of results to the UI context

pub mod binding;
pub mod disk_cache;
pub mod disk_journal;
pub mod downsampler;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod tiered_cache;
pub mod ui_context;

pub use binding::SinkBinding;
pub use disk_cache::{CACHE_DIR_NAME, DEFAULT_DISK_CACHE_SIZE, DiskImageCache};
pub use downsampler::Downsampler;
pub use http_fetcher::HttpFetcher;
pub use loader::{ImageLoader, RequestOutcome};
pub use memory_cache::{DEFAULT_HEAP_DIVISOR, MemoryImageCache};
pub use pipeline::FetchPipeline;
pub use scheduler::{RequestScheduler, Submission};
pub use stats::CacheStats;
pub use tiered_cache::TieredImageCache;
pub use ui_context::{Delivery, DeliveryOutcome, UiContext, is_ui_thread};
