//! Checkpoint repository trait.
//!
//! Defines the persistence gateway interface; the TOML-backed implementation
//! lives in the infrastructure crate.

use super::checkpoint::{Checkpoint, CheckpointId};
use crate::error::{RecoverableLoadError, Result};
use async_trait::async_trait;

/// Durable storage for one session's checkpoint.
///
/// # Implementation Notes
///
/// Implementations must never expose a half-written checkpoint to a reader
/// (write to a temporary file and rename, or equivalent). A checkpoint that
/// fails structural validation is reported as
/// [`RecoverableLoadError::Malformed`], never as a parse error.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Writes a checkpoint, replacing the previous one.
    ///
    /// # Returns
    ///
    /// - `Ok(CheckpointId)`: Checkpoint is durable
    /// - `Err(_)`: Storage-layer failure; callers log and keep going
    async fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointId>;

    /// Reads the latest checkpoint.
    ///
    /// # Returns
    ///
    /// - `Ok(Checkpoint)`: Checkpoint restored (migrated to the latest schema)
    /// - `Err(RecoverableLoadError::NotFound)`: Nothing saved yet
    /// - `Err(RecoverableLoadError::Malformed { .. })`: Unreadable; start fresh
    async fn load(&self) -> std::result::Result<Checkpoint, RecoverableLoadError>;
}
