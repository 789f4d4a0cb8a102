//! Step model and its forward-only status lifecycle.

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Execution status of a single step.
///
/// Allowed transitions:
///
/// ```text
/// Pending -> Running
/// Running -> Succeeded | FailedRetried | FailedEscalated | Cancelled
/// FailedRetried -> Running | Cancelled
/// ```
///
/// `Succeeded`, `FailedEscalated` and `Cancelled` are terminal. Nothing
/// returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    FailedRetried,
    FailedEscalated,
    Cancelled,
}

impl StepStatus {
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, FailedRetried)
                | (Running, FailedEscalated)
                | (Running, Cancelled)
                | (FailedRetried, Running)
                | (FailedRetried, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::FailedEscalated | StepStatus::Cancelled
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::FailedRetried => "failed-retried",
            StepStatus::FailedEscalated => "failed-escalated",
            StepStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One unit of execution within a plan.
///
/// `name` and `parameters` are opaque to the core; only the workflow
/// executor collaborator interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    status: StepStatus,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// Moves the step to `next`, rejecting any backwards or skipping move.
    pub fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CadenceError::InvalidTransition {
                step: self.name.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(step = %self.name, from = %self.status, to = %next, "step transition");
        self.status = next;
        Ok(())
    }

    /// Returns a copy reset to `Pending`, for handing a stored plan to a fresh run.
    pub fn fresh(&self) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            status: StepStatus::Pending,
        }
    }
}
