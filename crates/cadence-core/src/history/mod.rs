//! Bounded, memory-aware conversation history.
//!
//! [`HistoryStore`] keeps at most `max_turns` turns. When an append pushes it
//! over, the oldest non-system turns are evicted first; system turns go only
//! when nothing else is left to drop.

mod context;

pub use context::{estimate_tokens, select_for_analysis};

use crate::config::HistoryConfig;
use crate::session::Turn;
use serde::{Deserialize, Serialize};

/// Memory accounting reported by [`HistoryStore::memory_usage`].
///
/// `near_limit` and `size_warning` are advisory only; nothing blocks on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    pub turn_count: usize,
    pub max_turns: usize,
    pub usage_percent: f64,
    pub approx_bytes: u64,
    pub near_limit: bool,
    pub size_warning: bool,
}

impl MemoryStats {
    /// Human-readable advisory lines, empty when nothing is flagged.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.near_limit {
            out.push(format!(
                "History is at {:.0}% of capacity ({}/{} turns); older turns will be dropped.",
                self.usage_percent, self.turn_count, self.max_turns
            ));
        }
        if self.size_warning {
            out.push(format!(
                "History is using about {} bytes of memory.",
                self.approx_bytes
            ));
        }
        out
    }
}

/// Append-only bounded log of turns.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    turns: Vec<Turn>,
    config: HistoryConfig,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            turns: Vec::new(),
            config,
        }
    }

    /// Rebuilds a store from persisted turns, trimming if the limit shrank.
    pub fn from_turns(config: HistoryConfig, turns: Vec<Turn>) -> Self {
        let mut store = Self { turns, config };
        store.evict();
        store
    }

    /// Appends a turn. Never rejects input.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.evict();
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.config.max_turns
    }

    pub fn memory_usage(&self) -> MemoryStats {
        let turn_count = self.turns.len();
        let max_turns = self.config.max_turns;
        let usage_percent = if max_turns == 0 {
            100.0
        } else {
            turn_count as f64 * 100.0 / max_turns as f64
        };
        let approx_bytes: u64 = self.turns.iter().map(|t| t.approx_bytes() as u64).sum();

        MemoryStats {
            turn_count,
            max_turns,
            usage_percent,
            approx_bytes,
            near_limit: usage_percent >= self.config.near_limit_percent as f64,
            size_warning: approx_bytes > self.config.size_warning_bytes,
        }
    }

    /// Token-budgeted view for the analysis collaborator.
    pub fn select_for_analysis(&self, max_tokens: usize) -> Vec<Turn> {
        select_for_analysis(&self.turns, max_tokens)
    }

    /// Drops every non-system turn. Standing instructions survive.
    pub fn clear_conversation(&mut self) -> usize {
        let before = self.turns.len();
        self.turns.retain(Turn::is_system);
        before - self.turns.len()
    }

    fn evict(&mut self) {
        let max = self.config.max_turns;
        if self.turns.len() <= max {
            return;
        }
        let excess = self.turns.len() - max;

        // Partition: drop the oldest `excess` non-system turns first.
        let mut to_drop = excess;
        self.turns.retain(|turn| {
            if to_drop > 0 && !turn.is_system() {
                to_drop -= 1;
                false
            } else {
                true
            }
        });

        // Only system turns remain over the limit: trim from the front.
        if to_drop > 0 {
            self.turns.drain(..to_drop);
        }

        tracing::debug!(evicted = excess, turns = self.turns.len(), "history evicted");
    }
}
