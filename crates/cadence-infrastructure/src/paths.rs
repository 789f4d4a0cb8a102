//! Path resolution for cadence files.
//!
//! All locations come from `version_migrate::AppPaths` so they follow the
//! platform convention (XDG on Linux).
//!
//! ```text
//! ~/.config/cadence/
//! └── config.toml
//!
//! ~/.local/share/cadence/
//! ├── sessions/<session_name>.toml
//! └── logs/cadence.log.YYYY-MM-DD
//! ```

use cadence_core::config::CadenceConfig;
use cadence_core::error::{CadenceError, Result};
use std::path::PathBuf;
use version_migrate::AppPaths;

pub struct CadencePaths;

impl CadencePaths {
    fn app_paths() -> AppPaths {
        AppPaths::new("cadence")
    }

    pub fn config_dir() -> Result<PathBuf> {
        Self::app_paths()
            .config_dir()
            .map_err(|_| CadenceError::config("Cannot resolve config directory: home directory not found"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        Self::app_paths()
            .data_dir()
            .map_err(|_| CadenceError::config("Cannot resolve data directory: home directory not found"))
    }

    /// `<config_dir>/config.toml`
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// `<data_dir>/logs`
    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("logs"))
    }

    /// `<data_dir>/readline_history.txt`
    pub fn readline_history_file() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("readline_history.txt"))
    }

    /// The configured checkpoint directory, or `<data_dir>/sessions`.
    pub fn session_dir(config: &CadenceConfig) -> Result<PathBuf> {
        match &config.storage.session_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("sessions")),
        }
    }
}
