//! Command-line interface.

use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments; each one overrides the matching config file value.
#[derive(Debug, Parser)]
#[command(
    name = "imgcache",
    version,
    about = "Browse the images of a web page through a two-tier image cache",
    long_about = None
)]
pub struct CliArgs {
    /// Page listing the image URLs to browse.
    #[arg(value_name = "URL", env = "IMGCACHE_LISTING_URL")]
    pub listing_url: String,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", env = "IMGCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disk cache size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub disk_cache_size: Option<u64>,

    /// Keep images in memory only.
    #[arg(long)]
    pub no_disk_cache: bool,

    /// Requested cell width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Requested cell height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Cells per row.
    #[arg(long)]
    pub columns: Option<usize>,

    /// Visible rows per page.
    #[arg(long)]
    pub rows: Option<usize>,

    /// Number of pages to scroll through.
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// Seconds to wait for a page to finish loading.
    #[arg(long, default_value_t = 30)]
    pub page_timeout: u64,

    /// Clear both caches before browsing.
    #[arg(long)]
    pub clear_cache: bool,

    /// Write the effective configuration back to the config file.
    #[arg(long)]
    pub save_config: bool,
}
