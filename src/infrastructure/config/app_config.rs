//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::CliArgs;
use super::loader_config::ImageLoaderConfig;

pub(crate) const APP_NAME: &str = "imgcache";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, from `config.toml` overlaid with CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Grid browsing options.
    #[serde(default)]
    pub browse: BrowseConfig,

    /// Engine options.
    #[serde(default)]
    pub loader: ImageLoaderConfig,
}

/// Grid browsing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseConfig {
    /// Requested cell width in pixels.
    #[serde(default = "default_req_width")]
    pub req_width: u32,

    /// Requested cell height in pixels.
    #[serde(default = "default_req_height")]
    pub req_height: u32,

    /// Cells per row.
    #[serde(default = "default_columns")]
    pub columns: usize,

    /// Visible rows per page.
    #[serde(default = "default_rows")]
    pub rows: usize,
}

impl BrowseConfig {
    /// Cells visible at once.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.columns * self.rows
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            req_width: default_req_width(),
            req_height: default_req_height(),
            columns: default_columns(),
            rows: default_rows(),
        }
    }
}

const fn default_req_width() -> u32 {
    120
}

const fn default_req_height() -> u32 {
    150
}

const fn default_columns() -> usize {
    3
}

const fn default_rows() -> usize {
    4
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.loader.cache_dir = Some(cache_dir.clone());
        }
        if let Some(disk_cache_size) = args.disk_cache_size {
            self.loader.disk_cache_size = disk_cache_size;
        }
        if args.no_disk_cache {
            self.loader.disk_cache_enabled = false;
        }
        if let Some(width) = args.width {
            self.browse.req_width = width;
        }
        if let Some(height) = args.height {
            self.browse.req_height = height;
        }
        if let Some(columns) = args.columns {
            self.browse.columns = columns.max(1);
        }
        if let Some(rows) = args.rows {
            self.browse.rows = rows.max(1);
        }
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imgcache.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            browse: BrowseConfig::default(),
            loader: ImageLoaderConfig::default(),
        }
    }
}
