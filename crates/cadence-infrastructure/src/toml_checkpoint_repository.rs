//! TOML-based checkpoint repository implementation.
//!
//! Stores one session's checkpoint as `<session_dir>/<session_name>.toml`.
//! Every save replaces the whole file atomically; a reader sees either the
//! previous checkpoint or the new one, never a mix.

use async_trait::async_trait;
use cadence_core::error::{CadenceError, RecoverableLoadError, Result};
use cadence_core::session::{Checkpoint, CheckpointId, CheckpointRepository};
use std::path::{Path, PathBuf};
use tokio::task;

use crate::dto::create_checkpoint_migrator;
use crate::storage::AtomicTomlFile;

/// Entity name registered with the migrator.
const CHECKPOINT_ENTITY: &str = "checkpoint";

/// TOML-based persistence gateway.
///
/// # Features
///
/// - **Atomic writes**: tmp file + fsync + rename under an exclusive lock
/// - **Version migration**: older layouts are migrated on load via version-migrate
/// - **Recoverable loads**: missing or malformed files map to `RecoverableLoadError`
/// - **Async-safe**: file I/O runs in `tokio::task::spawn_blocking`
pub struct TomlCheckpointRepository {
    session_dir: PathBuf,
    session_name: String,
}

impl TomlCheckpointRepository {
    pub fn new(session_dir: PathBuf, session_name: impl Into<String>) -> Self {
        Self {
            session_dir,
            session_name: session_name.into(),
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.session_dir.join(format!("{}.toml", self.session_name))
    }

    fn load_sync(path: &Path) -> std::result::Result<Checkpoint, RecoverableLoadError> {
        let file = AtomicTomlFile::<toml::Value>::new(path.to_path_buf());
        let toml_value = match file.load() {
            Ok(Some(value)) => value,
            Ok(None) => return Err(RecoverableLoadError::NotFound),
            Err(e) => return Err(RecoverableLoadError::malformed(e.to_string())),
        };

        let migrator = create_checkpoint_migrator();
        let checkpoint: Checkpoint = migrator
            .load_flat_from(CHECKPOINT_ENTITY, toml_value)
            .map_err(|e| RecoverableLoadError::malformed(format!("migration failed: {}", e)))?;

        Self::validate(&checkpoint)?;
        Ok(checkpoint)
    }

    /// Structural checks beyond what deserialization enforces.
    fn validate(checkpoint: &Checkpoint) -> std::result::Result<(), RecoverableLoadError> {
        if chrono::DateTime::parse_from_rfc3339(&checkpoint.saved_at).is_err() {
            return Err(RecoverableLoadError::malformed(format!(
                "saved_at '{}' is not an RFC 3339 timestamp",
                checkpoint.saved_at
            )));
        }
        if checkpoint.memory_stats.turn_count != checkpoint.history.len() {
            return Err(RecoverableLoadError::malformed(format!(
                "memory_stats reports {} turns but history holds {}",
                checkpoint.memory_stats.turn_count,
                checkpoint.history.len()
            )));
        }
        Ok(())
    }

    fn save_sync(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
        // Serialize to JSON first (migrator works with JSON)
        let migrator = create_checkpoint_migrator();
        let json_str = migrator.save_domain_flat(CHECKPOINT_ENTITY, checkpoint)?;
        let json_value: serde_json::Value = serde_json::from_str(&json_str)?;
        let toml_value = json_to_toml(&json_value)?;

        AtomicTomlFile::<toml::Value>::new(path.to_path_buf()).save_locked(&toml_value)
    }
}

#[async_trait]
impl CheckpointRepository for TomlCheckpointRepository {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointId> {
        let path = self.checkpoint_path();
        let id = CheckpointId::new(&self.session_name, &checkpoint.saved_at);
        let checkpoint = checkpoint.clone();

        task::spawn_blocking(move || Self::save_sync(&path, &checkpoint))
            .await
            .map_err(|e| CadenceError::io(format!("Failed to spawn blocking task: {}", e)))??;

        tracing::debug!(checkpoint = %id, "checkpoint saved");
        Ok(id)
    }

    async fn load(&self) -> std::result::Result<Checkpoint, RecoverableLoadError> {
        let path = self.checkpoint_path();

        let result = task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| RecoverableLoadError::malformed(format!("load task failed: {}", e)))?;

        if let Err(RecoverableLoadError::Malformed { reason }) = &result {
            tracing::warn!(
                path = %self.checkpoint_path().display(),
                reason = %reason,
                "ignoring malformed checkpoint"
            );
        }
        result
    }
}

/// Converts a serde_json::Value to a toml::Value.
///
/// version-migrate works in JSON. TOML has no null, so null object members are
/// dropped; every optional field in the checkpoint layout is skipped when
/// absent, so this only ever sees nulls that mean "absent".
fn json_to_toml(json: &serde_json::Value) -> Result<toml::Value> {
    match json {
        serde_json::Value::Null => Err(CadenceError::serialization(
            "TOML",
            "null outside an object member",
        )),
        serde_json::Value::Bool(b) => Ok(toml::Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(toml::Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(toml::Value::Float(f))
            } else {
                Err(CadenceError::serialization(
                    "TOML",
                    format!("Unsupported JSON number: {}", n),
                ))
            }
        }
        serde_json::Value::String(s) => Ok(toml::Value::String(s.clone())),
        serde_json::Value::Array(arr) => {
            let toml_arr: Result<Vec<toml::Value>> = arr.iter().map(json_to_toml).collect();
            Ok(toml::Value::Array(toml_arr?))
        }
        serde_json::Value::Object(obj) => {
            let mut toml_map = toml::map::Map::new();
            for (k, v) in obj {
                if v.is_null() {
                    continue;
                }
                toml_map.insert(k.clone(), json_to_toml(v)?);
            }
            Ok(toml::Value::Table(toml_map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::history::MemoryStats;
    use cadence_core::session::{SessionContext, Turn};
    use tempfile::TempDir;

    fn checkpoint_with(turns: Vec<Turn>) -> Checkpoint {
        let stats = MemoryStats {
            turn_count: turns.len(),
            max_turns: 100,
            usage_percent: turns.len() as f64,
            approx_bytes: 512,
            near_limit: false,
            size_warning: false,
        };
        Checkpoint::new(turns, SessionContext::default(), stats)
    }

    #[tokio::test]
    async fn test_load_without_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");

        assert_eq!(repo.load().await.unwrap_err(), RecoverableLoadError::NotFound);
    }

    #[tokio::test]
    async fn test_save_returns_named_id() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "work");
        let checkpoint = checkpoint_with(vec![Turn::user("hi")]);

        let id = repo.save(&checkpoint).await.expect("Should save checkpoint");

        assert_eq!(id.as_str(), format!("work@{}", checkpoint.saved_at));
        assert!(temp_dir.path().join("work.toml").exists());
    }

    #[tokio::test]
    async fn test_garbage_file_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");
        std::fs::write(repo.checkpoint_path(), "history = [[[").unwrap();

        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, RecoverableLoadError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_version_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");
        std::fs::write(
            repo.checkpoint_path(),
            "version = \"9.9.9\"\nsaved_at = \"2026-01-01T00:00:00+00:00\"\n",
        )
        .unwrap();

        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, RecoverableLoadError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_inconsistent_stats_are_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");
        let mut checkpoint = checkpoint_with(vec![Turn::user("a"), Turn::user("b")]);
        checkpoint.memory_stats.turn_count = 7;
        repo.save(&checkpoint).await.unwrap();

        let err = repo.load().await.unwrap_err();
        match err {
            RecoverableLoadError::Malformed { reason } => assert!(reason.contains("7")),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_json_to_toml_drops_null_members() {
        let json = serde_json::json!({ "a": 1, "b": null, "c": { "d": null, "e": "x" } });
        let toml_value = json_to_toml(&json).unwrap();
        let table = toml_value.as_table().unwrap();

        assert!(table.contains_key("a"));
        assert!(!table.contains_key("b"));
        let nested = table["c"].as_table().unwrap();
        assert!(!nested.contains_key("d"));
        assert_eq!(nested["e"].as_str(), Some("x"));
    }
}
