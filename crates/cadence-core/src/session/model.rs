//! Mutable per-session context.

use crate::plan::Plan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-session state owned by the state machine and read by the pipeline.
///
/// `pending_operation` is the single slot for a plan; setting it replaces any
/// previous value, so at most one pending operation exists at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionContext {
    /// Opaque epic identifier the user is working on.
    pub current_epic_ref: Option<String>,
    /// Opaque story identifier the user is working on.
    pub current_story_ref: Option<String>,
    /// The plan awaiting confirmation or running, if any.
    pub pending_operation: Option<Plan>,
    /// Free-form user preferences.
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

impl SessionContext {
    pub fn set_pending(&mut self, plan: Plan) -> Option<Plan> {
        self.pending_operation.replace(plan)
    }

    pub fn take_pending(&mut self) -> Option<Plan> {
        self.pending_operation.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_operation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_pending_replaces_previous_plan() {
        let mut ctx = SessionContext::default();
        let first = Plan::new("first", vec![], "");
        let second = Plan::new("second", vec![], "");
        let first_id = first.id.clone();

        assert!(ctx.set_pending(first).is_none());
        let replaced = ctx.set_pending(second).expect("Should return the replaced plan");
        assert_eq!(replaced.id, first_id);
        assert_eq!(
            ctx.pending_operation.as_ref().map(|p| p.request.as_str()),
            Some("second")
        );
    }

    #[test]
    fn test_take_pending_clears_slot() {
        let mut ctx = SessionContext::default();
        ctx.set_pending(Plan::new("x", vec![], ""));
        assert!(ctx.take_pending().is_some());
        assert!(!ctx.has_pending());
    }
}
