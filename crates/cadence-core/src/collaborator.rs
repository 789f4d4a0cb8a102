//! Interfaces to the external collaborators the session core delegates to.
//!
//! The core never interprets what these do. Every call may be slow and may
//! fail; failures come back as `anyhow::Error` and are turned into
//! conversational replies at the call site.

use crate::plan::{Plan, Step};
use crate::session::Turn;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the analysis collaborator resolved a request into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// An executable plan to propose for confirmation.
    Plan(Plan),
    /// The request is underspecified; relay this question to the user.
    Clarification(String),
}

/// Turns a request plus selected context into a plan or a question.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, raw_input: &str, context: &[Turn]) -> Result<AnalysisOutcome>;
}

/// Suggests alternatives after a step has failed twice.
#[async_trait]
pub trait FailureAnalyzer: Send + Sync {
    async fn analyze_failure(&self, step: &Step, error: &str) -> Result<Vec<String>>;
}

/// Runs one step's underlying action.
///
/// Progress lines are sent on `progress` in the order they should appear in
/// the transcript. Long-running actions should watch `cancel` and wind down
/// when it fires; the pipeline abandons them after the grace period anyway.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        cancel: CancellationToken,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<()>;
}
