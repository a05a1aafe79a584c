//! Application configuration.

pub mod app_config;
pub mod args;
pub mod loader_config;
pub mod storage;

pub use app_config::{AppConfig, BrowseConfig, LogLevel};
pub use args::CliArgs;
pub use loader_config::ImageLoaderConfig;
pub use storage::{ConfigError, StorageManager};
