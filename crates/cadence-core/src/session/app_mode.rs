//! Session state for the confirmation/intent state machine.

use crate::plan::Plan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the session stands with respect to its pending operation.
///
/// There is no terminal state; the machine cycles for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "data")]
pub enum SessionState {
    /// No pending operation.
    #[default]
    Idle,
    /// A plan has been proposed and waits for the user's next turn.
    AwaitingConfirmation {
        /// The plan awaiting confirmation.
        plan: Plan,
    },
    /// The execution pipeline is running the plan.
    Executing {
        /// The plan being executed.
        plan: Plan,
    },
}

impl SessionState {
    pub fn pending_plan(&self) -> Option<&Plan> {
        match self {
            SessionState::Idle => None,
            SessionState::AwaitingConfirmation { plan } | SessionState::Executing { plan } => {
                Some(plan)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        matches!(self, SessionState::AwaitingConfirmation { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingConfirmation { .. } => write!(f, "awaiting confirmation"),
            SessionState::Executing { .. } => write!(f, "executing"),
        }
    }
}
