//! Durable snapshot of a session.

use super::model::SessionContext;
use super::message::Turn;
use crate::history::MemoryStats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of history plus session context at one transition point.
///
/// Loading a checkpoint must reproduce exactly the history and context that
/// existed when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Full bounded turn list, oldest first.
    pub history: Vec<Turn>,
    pub session_context: SessionContext,
    pub memory_stats: MemoryStats,
    /// RFC 3339 timestamp of the snapshot.
    pub saved_at: String,
}

impl Checkpoint {
    pub fn new(history: Vec<Turn>, session_context: SessionContext, memory_stats: MemoryStats) -> Self {
        Self {
            history,
            session_context,
            memory_stats,
            saved_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Identifier returned by a successful save: `<session_name>@<saved_at>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn new(session_name: &str, saved_at: &str) -> Self {
        Self(format!("{}@{}", session_name, saved_at))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
