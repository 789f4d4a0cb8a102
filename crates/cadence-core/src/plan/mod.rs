//! Plans produced by the analysis collaborator.
//!
//! A `Plan` is an ordered list of [`Step`]s plus a human-readable rationale.
//! It exists from the moment analysis resolves a request until the plan is
//! either executed or declined.

mod step;

pub use step::{Step, StepStatus};

use serde::{Deserialize, Serialize};

/// An executable plan awaiting confirmation or running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier (UUID format).
    pub id: String,
    /// The request text the plan was derived from.
    pub request: String,
    /// Ordered steps.
    pub steps: Vec<Step>,
    /// Why the analysis chose these steps.
    pub rationale: String,
}

impl Plan {
    pub fn new(request: impl Into<String>, steps: Vec<Step>, rationale: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request: request.into(),
            steps,
            rationale: rationale.into(),
        }
    }

    /// Renders the plan as a numbered confirmation prompt.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if !self.rationale.is_empty() {
            out.push_str(&self.rationale);
            out.push('\n');
        }
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, step.name));
        }
        out.push_str("Proceed? (yes/no)");
        out
    }

    /// Step copies reset to `Pending`, handed to a fresh pipeline run.
    pub fn fresh_steps(&self) -> Vec<Step> {
        self.steps.iter().map(Step::fresh).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_numbers_steps() {
        let plan = Plan::new(
            "build and deploy",
            vec![Step::new("build"), Step::new("deploy")],
            "Two steps.",
        );
        let summary = plan.summary();
        assert!(summary.starts_with("Two steps."));
        assert!(summary.contains("  1. build"));
        assert!(summary.contains("  2. deploy"));
        assert!(summary.ends_with("Proceed? (yes/no)"));
    }

    #[test]
    fn test_plan_ids_are_unique() {
        let a = Plan::new("a", vec![], "");
        let b = Plan::new("a", vec![], "");
        assert_ne!(a.id, b.id);
    }
}
