//! Configuration loading.
//!
//! Reads `CadenceConfig` from `~/.config/cadence/config.toml` or an explicit
//! path. A missing or empty file yields defaults; a malformed one is an error
//! naming the file.

use crate::paths::CadencePaths;
use crate::storage::AtomicTomlFile;
use cadence_core::config::CadenceConfig;
use cadence_core::error::{CadenceError, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    /// Uses `explicit` when given, otherwise the platform config file.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => CadencePaths::config_file()?,
        };
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CadenceConfig> {
        let file = AtomicTomlFile::<CadenceConfig>::new(self.path.clone());
        match file.load() {
            Ok(Some(config)) => {
                tracing::debug!(path = %self.path.display(), "loaded config");
                Ok(config)
            }
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "no config file, using defaults");
                Ok(CadenceConfig::default())
            }
            Err(e) => Err(CadenceError::config(format!(
                "Failed to load '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = ConfigService::new(Some(&path)).unwrap().load().unwrap();
        assert_eq!(config, CadenceConfig::default());
    }

    #[test]
    fn test_values_are_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[execution]\ngrace_period_ms = 250\n\n[storage]\nsession_name = \"work\"\n",
        )
        .unwrap();

        let config = ConfigService::new(Some(&path)).unwrap().load().unwrap();
        assert_eq!(config.execution.grace_period_ms, 250);
        assert_eq!(config.storage.session_name, "work");
        assert_eq!(config.history.max_turns, 100);
    }

    #[test]
    fn test_malformed_file_is_config_error_naming_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[history]\nmax_turns = \"many\"\n").unwrap();

        let err = ConfigService::new(Some(&path)).unwrap().load().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("config.toml"));
    }
}
