//! Runtime configuration model.
//!
//! Every field has a default so a missing or partial `config.toml` is valid.
//! Loading from disk lives in the infrastructure crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    pub history: HistoryConfig,
    pub context: ContextConfig,
    pub execution: ExecutionConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum retained turns.
    pub max_turns: usize,
    /// Advisory byte threshold for the size warning.
    pub size_warning_bytes: u64,
    /// Usage percent at which `near_limit` is reported.
    pub near_limit_percent: u8,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            size_warning_bytes: 10 * 1024 * 1024,
            near_limit_percent: 80,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    pub max_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_tokens: 4000 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub grace_period_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl ExecutionConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub analysis_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_secs: 60,
            idle_timeout_secs: 300,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Checkpoint directory. `None` resolves to `<data_dir>/sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
    /// Checkpoint file stem.
    pub session_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_dir: None,
            session_name: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: CadenceConfig = toml::from_str("").unwrap();
        assert_eq!(config, CadenceConfig::default());
        assert_eq!(config.history.max_turns, 100);
        assert_eq!(config.history.size_warning_bytes, 10 * 1024 * 1024);
        assert_eq!(config.context.max_tokens, 4000);
        assert_eq!(config.execution.grace_period(), Duration::from_secs(5));
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.storage.session_name, "default");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: CadenceConfig = toml::from_str(
            r#"
[history]
max_turns = 20

[storage]
session_dir = "/tmp/cadence"
"#,
        )
        .unwrap();

        assert_eq!(config.history.max_turns, 20);
        assert_eq!(config.history.near_limit_percent, 80);
        assert_eq!(config.storage.session_dir, Some(PathBuf::from("/tmp/cadence")));
        assert_eq!(config.storage.session_name, "default");
    }
}
