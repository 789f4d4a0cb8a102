//! Checkpoint DTOs and migrations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use version_migrate::{IntoDomain, MigratesTo, Versioned};

use cadence_core::history::MemoryStats;
use cadence_core::plan::Plan;
use cadence_core::session::{Checkpoint, SessionContext, Turn};

/// Checkpoint V1.0.0 (initial layout, no preferences).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct CheckpointV1_0_0 {
    pub saved_at: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_epic_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_story_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_operation: Option<Plan>,
    pub memory_stats: MemoryStats,
}

/// Checkpoint V1.1.0 (added user preferences).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
pub struct CheckpointV1_1_0 {
    pub saved_at: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_epic_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_story_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_operation: Option<Plan>,
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

/// Type alias for the latest Checkpoint version.
pub type CheckpointDTO = CheckpointV1_1_0;

// ============================================================================
// Migration implementations
// ============================================================================

/// Migration from CheckpointV1_0_0 to CheckpointV1_1_0.
impl MigratesTo<CheckpointV1_1_0> for CheckpointV1_0_0 {
    fn migrate(self) -> CheckpointV1_1_0 {
        CheckpointV1_1_0 {
            saved_at: self.saved_at,
            history: self.history,
            current_epic_ref: self.current_epic_ref,
            current_story_ref: self.current_story_ref,
            pending_operation: self.pending_operation,
            memory_stats: self.memory_stats,
            preferences: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Domain model conversions
// ============================================================================

impl IntoDomain<Checkpoint> for CheckpointV1_1_0 {
    fn into_domain(self) -> Checkpoint {
        Checkpoint {
            history: self.history,
            session_context: SessionContext {
                current_epic_ref: self.current_epic_ref,
                current_story_ref: self.current_story_ref,
                pending_operation: self.pending_operation,
                preferences: self.preferences,
            },
            memory_stats: self.memory_stats,
            saved_at: self.saved_at,
        }
    }
}

impl version_migrate::FromDomain<Checkpoint> for CheckpointV1_1_0 {
    fn from_domain(checkpoint: Checkpoint) -> Self {
        let context = checkpoint.session_context;
        CheckpointV1_1_0 {
            saved_at: checkpoint.saved_at,
            history: checkpoint.history,
            current_epic_ref: context.current_epic_ref,
            current_story_ref: context.current_story_ref,
            pending_operation: context.pending_operation,
            memory_stats: checkpoint.memory_stats,
            preferences: context.preferences,
        }
    }
}

// ============================================================================
// Migrator factory
// ============================================================================

/// Creates and configures a Migrator instance for checkpoints.
///
/// # Migration Path
///
/// - V1.0.0 → V1.1.0: Adds `preferences` (empty)
/// - V1.1.0 → Checkpoint: Converts DTO to domain model
pub fn create_checkpoint_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();

    let checkpoint_path = version_migrate::Migrator::define("checkpoint")
        .from::<CheckpointV1_0_0>()
        .step::<CheckpointV1_1_0>()
        .into_with_save::<Checkpoint>();

    migrator
        .register(checkpoint_path)
        .expect("Failed to register checkpoint migration path");

    migrator
}
