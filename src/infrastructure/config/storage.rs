//! Loading and saving `config.toml`.

use super::app_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, AppConfig};
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while locating, reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No per-user config directory on this platform.
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The defaults could not be serialized.
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    /// The file is not valid TOML for [`AppConfig`].
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Owns the directory `config.toml` lives in.
#[derive(Debug, Clone)]
pub struct StorageManager {
    config_dir: PathBuf,
}

impl StorageManager {
    /// Uses the per-user config directory.
    ///
    /// # Errors
    /// `ConfigDirNotFound` if the platform has no home directory.
    pub fn new() -> Result<Self, ConfigError> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| Self::with_dir(dirs.config_dir().to_path_buf()))
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Uses `config_dir` instead of the per-user directory.
    #[must_use]
    pub const fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Default location of `config.toml`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Reads the config at `path_override`, or at [`Self::config_path`].
    ///
    /// A missing file is created with the defaults. A file that does not
    /// parse is left alone and the defaults are used for this run.
    ///
    /// # Errors
    /// I/O failures reading the file or writing the defaults.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let path = path_override.map_or_else(|| self.config_path(), Path::to_path_buf);

        if !path.exists() {
            info!(path = %path.display(), "No config file, writing defaults");
            let defaults = AppConfig::default();
            Self::write_atomically(&path, &defaults)?;
            return Ok(defaults);
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str::<AppConfig>(&content).or_else(|e| {
            warn!(path = %path.display(), error = %e, "Config file is invalid, using defaults");
            Ok(AppConfig::default())
        })
    }

    /// Writes `config` to `path_override`, or to [`Self::config_path`].
    ///
    /// # Errors
    /// Serialization or I/O failures.
    pub fn save_config(
        &self,
        config: &AppConfig,
        path_override: Option<&Path>,
    ) -> Result<PathBuf, ConfigError> {
        let path = path_override.map_or_else(|| self.config_path(), Path::to_path_buf);
        Self::write_atomically(&path, config)?;
        Ok(path)
    }

    /// Serializes `data` next to `path` and renames it into place.
    fn write_atomically<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(data)?;
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("config path has no parent"))?;
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        staged.write_all(content.as_bytes())?;
        staged.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().expect("tempdir");
        let storage = StorageManager::with_dir(dir.path().join("imgcache"));

        let config = storage.load_config(None).expect("load");
        assert_eq!(config.browse.columns, 3);
        assert!(storage.config_path().exists());

        let reloaded = storage.load_config(None).expect("reload");
        assert_eq!(reloaded.loader, config.loader);
    }

    #[test]
    fn test_invalid_file_falls_back_without_overwriting() {
        let dir = tempdir().expect("tempdir");
        let storage = StorageManager::with_dir(dir.path().to_path_buf());
        fs::write(storage.config_path(), "invalid_toml = [").expect("write");

        let config = storage.load_config(None).expect("load");
        assert_eq!(config.browse.rows, 4);
        let content = fs::read_to_string(storage.config_path()).expect("read");
        assert_eq!(content, "invalid_toml = [");
    }

    #[test]
    fn test_override_path_is_used() {
        let dir = tempdir().expect("tempdir");
        let storage = StorageManager::with_dir(dir.path().join("unused"));
        let custom = dir.path().join("custom.toml");
        fs::write(&custom, "[browse]\nrows = 2\n").expect("write");

        let config = storage.load_config(Some(&custom)).expect("load");
        assert_eq!(config.browse.rows, 2);
        assert!(!dir.path().join("unused").exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().expect("tempdir");
        let storage = StorageManager::with_dir(dir.path().to_path_buf());
        let mut config = AppConfig::default();
        config.loader.disk_cache_size = 4096;
        config.browse.columns = 5;

        let path = storage.save_config(&config, None).expect("save");
        assert_eq!(path, storage.config_path());
        let loaded = storage.load_config(None).expect("load");
        assert_eq!(loaded.loader.disk_cache_size, 4096);
        assert_eq!(loaded.browse.columns, 5);
    }

    #[test]
    fn test_save_to_override_path() {
        let dir = tempdir().expect("tempdir");
        let storage = StorageManager::with_dir(dir.path().join("unused"));
        let custom = dir.path().join("nested").join("custom.toml");
        let mut config = AppConfig::default();
        config.browse.rows = 7;

        storage.save_config(&config, Some(&custom)).expect("save");
        assert!(!storage.config_path().exists());
        let loaded = storage.load_config(Some(&custom)).expect("load");
        assert_eq!(loaded.browse.rows, 7);
    }
}
