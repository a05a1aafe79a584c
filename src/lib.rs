//! imgcache - a two-tier image loading cache.
//!
//! Images are looked up in a memory LRU of decoded bitmaps, then in a
//! journaled disk LRU of encoded bodies, and finally fetched over HTTP.
//! Identical requests share one fetch, queued requests run newest first, and
//! results are only ever shown by a view still waiting for them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;
/// Presentation layer containing views driven by the loader.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imgcache";
