//! Conversation turn types.
//!
//! A `Turn` is one recorded conversational event. Turns are immutable once
//! created; the history store only ever hands out shared references.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key carrying the classified intent of a user turn.
pub const META_INTENT: &str = "intent";
/// Metadata key carrying the step name of a progress turn.
pub const META_STEP: &str = "step";
/// Metadata key carrying the step status of a progress turn.
pub const META_STEP_STATUS: &str = "step_status";
/// Metadata key marking the kind of assistant output (reply, progress, warning...).
pub const META_KIND: &str = "kind";

/// Represents the role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Input from the user.
    User,
    /// Output from the assistant (replies and progress messages).
    Assistant,
    /// Standing instructions. Exempt from ordinary eviction.
    System,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::System => write!(f, "system"),
        }
    }
}

/// A single turn in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the turn's author.
    pub role: TurnRole,
    /// The text content of the turn.
    pub content: String,
    /// Timestamp when the turn was created (RFC 3339).
    pub timestamp: String,
    /// Open key-value annotations (intent tag, step name, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    /// Adds a metadata entry. Builder-style, consumed before the turn is stored.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == TurnRole::System
    }

    /// Approximate in-memory footprint used for the byte-size warning.
    pub fn approx_bytes(&self) -> usize {
        let metadata: usize = self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        self.content.len() + self.timestamp.len() + metadata + std::mem::size_of::<Self>()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
