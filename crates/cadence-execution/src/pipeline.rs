//! The step execution pipeline.
//!
//! Runs a plan's steps in order. Each step is retried once on failure; a
//! second failure is escalated to the failure analyzer and halts the run.
//! Cancellation is checked at step boundaries, and a step still running when
//! the grace window closes is abandoned and marked cancelled.

use crate::cancellation::CancellationController;
use async_trait::async_trait;
use cadence_core::collaborator::{FailureAnalyzer, StepExecutor};
use cadence_core::config::ExecutionConfig;
use cadence_core::plan::{Step, StepStatus};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, sleep_until};

/// Attempts per step: the first try plus one automatic retry.
const MAX_ATTEMPTS: u32 = 2;

/// Progress reported while a plan runs.
///
/// `Display` renders the line shown to the user. The `Retrying` line must not
/// mention failure; a transient failure is never surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StepStarted {
        index: usize,
        total: usize,
        step: String,
        attempt: u32,
    },
    StepProgress {
        step: String,
        message: String,
    },
    Retrying {
        step: String,
    },
    StepSucceeded {
        index: usize,
        total: usize,
        step: String,
    },
    Escalated {
        step: String,
        error: String,
        alternatives: Vec<String>,
    },
    Heartbeat {
        step: String,
        elapsed_ms: u64,
    },
    Cancelled {
        completed: usize,
        total: usize,
    },
}

impl PipelineEvent {
    /// Whether the observer should write a checkpoint after this event.
    pub fn is_checkpoint_boundary(&self) -> bool {
        matches!(
            self,
            PipelineEvent::StepStarted { .. }
                | PipelineEvent::StepSucceeded { .. }
                | PipelineEvent::Escalated { .. }
                | PipelineEvent::Cancelled { .. }
        )
    }

    pub fn step_name(&self) -> Option<&str> {
        match self {
            PipelineEvent::StepStarted { step, .. }
            | PipelineEvent::StepProgress { step, .. }
            | PipelineEvent::Retrying { step }
            | PipelineEvent::StepSucceeded { step, .. }
            | PipelineEvent::Escalated { step, .. }
            | PipelineEvent::Heartbeat { step, .. } => Some(step),
            PipelineEvent::Cancelled { .. } => None,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StepStarted {
                index,
                total,
                step,
                attempt,
            } => {
                if *attempt > 1 {
                    write!(f, "Running step {}/{}: {} (attempt {})", index + 1, total, step, attempt)
                } else {
                    write!(f, "Running step {}/{}: {}", index + 1, total, step)
                }
            }
            PipelineEvent::StepProgress { message, .. } => write!(f, "  {}", message),
            PipelineEvent::Retrying { step } => write!(f, "Retrying '{}'...", step),
            PipelineEvent::StepSucceeded { index, total, step } => {
                write!(f, "Step {}/{} done: {}", index + 1, total, step)
            }
            PipelineEvent::Escalated {
                step,
                error,
                alternatives,
            } => {
                write!(f, "Step '{}' could not be completed: {}", step, error)?;
                write!(f, "\nYou could try one of these instead:")?;
                for (i, alternative) in alternatives.iter().enumerate() {
                    write!(f, "\n  {}. {}", i + 1, alternative)?;
                }
                write!(f, "\nReply with a number to pick one.")
            }
            PipelineEvent::Heartbeat { step, elapsed_ms } => {
                write!(f, "Still working on '{}', elapsed {}ms", step, elapsed_ms)
            }
            PipelineEvent::Cancelled { completed, total } => {
                write!(f, "Cancelled. {}/{} steps completed.", completed, total)
            }
        }
    }
}

/// Receives pipeline events in order, with the current step list.
///
/// The session uses this to append progress turns and write checkpoints, so
/// every event is awaited before the pipeline moves on.
#[async_trait]
pub trait PipelineObserver: Send {
    async fn on_event(&mut self, event: PipelineEvent, steps: &[Step]);
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Every step succeeded.
    Succeeded,
    /// A step failed twice; later steps were not started.
    PartiallyFailed {
        step: String,
        error: String,
        alternatives: Vec<String>,
    },
    /// Cancellation was observed; no step started after it.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    /// Final state of every step, in plan order.
    pub steps: Vec<Step>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status() == StepStatus::Succeeded)
            .count()
    }
}

enum AttemptResult {
    Succeeded,
    Failed(String),
    /// The grace window closed while the action was still running.
    Abandoned,
}

enum StepOutcome {
    Succeeded,
    Escalated { error: String, alternatives: Vec<String> },
    Cancelled,
}

/// Runs plans against a step executor.
pub struct ExecutionPipeline {
    executor: Arc<dyn StepExecutor>,
    failure_analyzer: Arc<dyn FailureAnalyzer>,
    grace_period: Duration,
    heartbeat_interval: Duration,
}

impl ExecutionPipeline {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        failure_analyzer: Arc<dyn FailureAnalyzer>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            executor,
            failure_analyzer,
            grace_period: config.grace_period(),
            heartbeat_interval: config.heartbeat_interval().max(Duration::from_millis(1)),
        }
    }

    /// A fresh single-use controller with the configured grace period.
    pub fn controller(&self) -> CancellationController {
        CancellationController::new(self.grace_period)
    }

    /// Runs `steps` in order until all succeed, one escalates, or
    /// cancellation is observed.
    pub async fn run(
        &self,
        mut steps: Vec<Step>,
        controller: &CancellationController,
        observer: &mut dyn PipelineObserver,
    ) -> PipelineReport {
        let started = Instant::now();
        let total = steps.len();
        let mut status = PipelineStatus::Succeeded;

        for index in 0..total {
            if controller.is_cancelled() {
                status = PipelineStatus::Cancelled;
                break;
            }

            match self.run_step(&mut steps, index, controller, observer).await {
                StepOutcome::Succeeded => {}
                StepOutcome::Escalated {
                    error,
                    alternatives,
                } => {
                    status = PipelineStatus::PartiallyFailed {
                        step: steps[index].name.clone(),
                        error,
                        alternatives,
                    };
                    break;
                }
                StepOutcome::Cancelled => {
                    status = PipelineStatus::Cancelled;
                    break;
                }
            }
        }

        if status == PipelineStatus::Cancelled {
            let completed = steps
                .iter()
                .filter(|s| s.status() == StepStatus::Succeeded)
                .count();
            observer
                .on_event(PipelineEvent::Cancelled { completed, total }, &steps)
                .await;
            controller.finalize();
            tracing::info!(
                completed,
                total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "pipeline cancelled"
            );
        } else {
            let outcome = match status {
                PipelineStatus::Succeeded => "succeeded",
                _ => "partially_failed",
            };
            tracing::info!(
                outcome,
                total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "pipeline finished"
            );
        }

        PipelineReport {
            status,
            steps,
            elapsed: started.elapsed(),
        }
    }

    async fn run_step(
        &self,
        steps: &mut [Step],
        index: usize,
        controller: &CancellationController,
        observer: &mut dyn PipelineObserver,
    ) -> StepOutcome {
        let total = steps.len();
        let name = steps[index].name.clone();
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if controller.is_cancelled() {
                // A step that never ran stays Pending.
                if steps[index].status() == StepStatus::FailedRetried {
                    self.mark(&mut steps[index], StepStatus::Cancelled);
                }
                return StepOutcome::Cancelled;
            }

            self.mark(&mut steps[index], StepStatus::Running);
            tracing::debug!(step = %name, attempt, "step started");
            observer
                .on_event(
                    PipelineEvent::StepStarted {
                        index,
                        total,
                        step: name.clone(),
                        attempt,
                    },
                    steps,
                )
                .await;

            match self.attempt(steps, index, controller, observer).await {
                AttemptResult::Succeeded => {
                    self.mark(&mut steps[index], StepStatus::Succeeded);
                    tracing::debug!(step = %name, attempt, "step succeeded");
                    observer
                        .on_event(
                            PipelineEvent::StepSucceeded {
                                index,
                                total,
                                step: name.clone(),
                            },
                            steps,
                        )
                        .await;
                    return StepOutcome::Succeeded;
                }
                AttemptResult::Abandoned => {
                    self.mark(&mut steps[index], StepStatus::Cancelled);
                    tracing::info!(step = %name, "step abandoned after grace period");
                    return StepOutcome::Cancelled;
                }
                AttemptResult::Failed(_) if controller.is_cancelled() => {
                    // The action stopped because it saw the cancellation.
                    self.mark(&mut steps[index], StepStatus::Cancelled);
                    return StepOutcome::Cancelled;
                }
                AttemptResult::Failed(error) => {
                    last_error = error;
                    if attempt < MAX_ATTEMPTS {
                        self.mark(&mut steps[index], StepStatus::FailedRetried);
                        tracing::info!(step = %name, attempt, reason = %last_error, "step failed, retrying");
                        observer
                            .on_event(PipelineEvent::Retrying { step: name.clone() }, steps)
                            .await;
                    }
                }
            }
        }

        tracing::warn!(step = %name, reason = %last_error, "step failed twice, escalating");

        let Some(alternatives) = self
            .alternatives_for(&steps[index], &last_error, controller)
            .await
        else {
            self.mark(&mut steps[index], StepStatus::Cancelled);
            tracing::info!(step = %name, "cancelled during failure analysis");
            return StepOutcome::Cancelled;
        };
        self.mark(&mut steps[index], StepStatus::FailedEscalated);
        observer
            .on_event(
                PipelineEvent::Escalated {
                    step: name,
                    error: last_error.clone(),
                    alternatives: alternatives.clone(),
                },
                steps,
            )
            .await;

        StepOutcome::Escalated {
            error: last_error,
            alternatives,
        }
    }

    /// One invocation of the step's action, relaying progress, emitting
    /// heartbeats during silence, and enforcing the grace window.
    async fn attempt(
        &self,
        steps: &[Step],
        index: usize,
        controller: &CancellationController,
        observer: &mut dyn PipelineObserver,
    ) -> AttemptResult {
        let step = &steps[index];
        let token = controller.token();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();

        let action = self.executor.execute(step, token.clone(), tx);
        tokio::pin!(action);

        let mut heartbeat = interval_at(
            started + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        let grace = sleep_until(started);
        tokio::pin!(grace);
        let mut grace_armed = false;

        loop {
            tokio::select! {
                biased;

                result = &mut action => {
                    while let Ok(message) = rx.try_recv() {
                        observer
                            .on_event(PipelineEvent::StepProgress { step: step.name.clone(), message }, steps)
                            .await;
                    }
                    return match result {
                        Ok(()) => AttemptResult::Succeeded,
                        Err(e) => AttemptResult::Failed(format!("{:#}", e)),
                    };
                }
                Some(message) = rx.recv() => {
                    heartbeat.reset();
                    observer
                        .on_event(PipelineEvent::StepProgress { step: step.name.clone(), message }, steps)
                        .await;
                }
                _ = token.cancelled(), if !grace_armed => {
                    let deadline = controller
                        .deadline()
                        .unwrap_or_else(|| Instant::now() + controller.grace_period());
                    grace.as_mut().reset(deadline);
                    grace_armed = true;
                }
                _ = &mut grace, if grace_armed => {
                    return AttemptResult::Abandoned;
                }
                _ = heartbeat.tick() => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    observer
                        .on_event(PipelineEvent::Heartbeat { step: step.name.clone(), elapsed_ms }, steps)
                        .await;
                }
            }
        }
    }

    /// Asks the failure analyzer for alternatives. Returns `None` as soon as
    /// cancellation is observed; the analysis is dropped unfinished.
    async fn alternatives_for(
        &self,
        step: &Step,
        error: &str,
        controller: &CancellationController,
    ) -> Option<Vec<String>> {
        let token = controller.token();
        let result = tokio::select! {
            biased;

            _ = token.cancelled() => return None,
            result = self.failure_analyzer.analyze_failure(step, error) => result,
        };

        Some(match result {
            Ok(alternatives) if !alternatives.is_empty() => alternatives,
            Ok(_) => default_alternatives(step),
            Err(e) => {
                tracing::warn!(step = %step.name, reason = %format!("{:#}", e), "failure analysis unavailable");
                default_alternatives(step)
            }
        })
    }

    fn mark(&self, step: &mut Step, next: StepStatus) {
        if let Err(e) = step.transition(next) {
            // Transitions above follow the lifecycle; reaching this is a bug.
            tracing::error!(step = %step.name, reason = %e, "rejected step transition");
        }
    }
}

fn default_alternatives(step: &Step) -> Vec<String> {
    vec![
        format!("Retry '{}' later", step.name),
        format!("Skip '{}' and continue with the remaining steps", step.name),
        "Rephrase the request so it can be planned differently".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrying_line_reads_as_progress() {
        let line = PipelineEvent::Retrying {
            step: "deploy".to_string(),
        }
        .to_string()
        .to_lowercase();
        assert!(line.contains("retrying"));
        assert!(!line.contains("error"));
        assert!(!line.contains("fail"));
    }

    #[test]
    fn test_escalated_line_lists_numbered_alternatives() {
        let line = PipelineEvent::Escalated {
            step: "deploy".to_string(),
            error: "timeout".to_string(),
            alternatives: vec!["wait".to_string(), "skip".to_string()],
        }
        .to_string();
        assert!(line.contains("timeout"));
        assert!(line.contains("  1. wait"));
        assert!(line.contains("  2. skip"));
    }

    #[test]
    fn test_checkpoint_boundaries() {
        assert!(
            PipelineEvent::StepStarted {
                index: 0,
                total: 1,
                step: "a".into(),
                attempt: 1
            }
            .is_checkpoint_boundary()
        );
        assert!(
            !PipelineEvent::Heartbeat {
                step: "a".into(),
                elapsed_ms: 1
            }
            .is_checkpoint_boundary()
        );
    }

    #[test]
    fn test_default_alternatives_are_never_empty() {
        assert!(!default_alternatives(&Step::new("x")).is_empty());
    }
}
