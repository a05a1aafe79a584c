//! Engine configuration, fixed at construction.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::infrastructure::image::{CACHE_DIR_NAME, DEFAULT_DISK_CACHE_SIZE, DEFAULT_HEAP_DIVISOR};
use crate::infrastructure::system::{detect_cpu_count, detect_total_memory};

use super::app_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER};

/// Configuration for the image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoaderConfig {
    /// Maximum disk cache size in bytes.
    pub disk_cache_size: u64,
    /// Whether to use the persistent tier at all.
    pub disk_cache_enabled: bool,
    /// Share of the heap budget given to decoded bitmaps, as a divisor.
    pub memory_cache_divisor: u64,
    /// Heap budget in bytes. Defaults to total system memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_budget: Option<u64>,
    /// Disk cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Concurrent loads. Defaults to CPU count + 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_workers: Option<usize>,
    /// Upper bound on worker threads, decode threads included. Defaults to CPU count * 2 + 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Idle worker lifetime in seconds.
    pub keep_alive_secs: u64,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            disk_cache_size: DEFAULT_DISK_CACHE_SIZE,
            disk_cache_enabled: true,
            memory_cache_divisor: DEFAULT_HEAP_DIVISOR,
            heap_budget: None,
            cache_dir: None,
            core_workers: None,
            max_workers: None,
            keep_alive_secs: 10,
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl ImageLoaderConfig {
    /// Concurrent loads.
    #[must_use]
    pub fn core_workers(&self) -> usize {
        self.core_workers
            .unwrap_or_else(|| detect_cpu_count() + 1)
            .max(1)
    }

    /// Worker thread ceiling, never below [`Self::core_workers`].
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| detect_cpu_count() * 2 + 1)
            .max(self.core_workers())
    }

    /// Heap budget the memory tier is carved from.
    #[must_use]
    pub fn heap_budget(&self) -> u64 {
        self.heap_budget.unwrap_or_else(detect_total_memory)
    }

    /// Disk cache directory, defaulting to the per-user cache dir.
    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Idle worker lifetime.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Whole-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Returns the default disk cache directory.
fn default_cache_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
        || {
            std::env::temp_dir()
                .join(APP_NAME)
                .join("cache")
                .join(CACHE_DIR_NAME)
        },
        |dirs| dirs.cache_dir().join(CACHE_DIR_NAME),
    )
}
