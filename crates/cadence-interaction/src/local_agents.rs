//! Built-in collaborators so the binary runs without external services.
//!
//! They sit behind the same traits a real analysis service or workflow
//! engine would implement.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use cadence_core::collaborator::{AnalysisOutcome, AnalysisService, FailureAnalyzer, StepExecutor};
use cadence_core::plan::{Plan, Step};
use cadence_core::session::Turn;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

static STEP_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bthen\b|;|\n").unwrap());

static LEADING_JOINER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(and|also|after that|finally)\b[\s,]*").unwrap());

/// Rule-based planner: one step per clause separated by "then", ";" or a newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPlanner;

impl LocalPlanner {
    fn split(request: &str) -> Vec<String> {
        STEP_SEPARATOR
            .split(request)
            .map(|part| {
                let part = part.trim().trim_matches(|c: char| c == ',' || c == '.').trim();
                LEADING_JOINER.replace(part, "").trim().to_string()
            })
            .filter(|part| !part.is_empty())
            .collect()
    }
}

#[async_trait]
impl AnalysisService for LocalPlanner {
    async fn analyze(&self, raw_input: &str, context: &[Turn]) -> Result<AnalysisOutcome> {
        let clauses = Self::split(raw_input);
        tracing::debug!(clauses = clauses.len(), context_turns = context.len(), "local planning");

        if clauses.is_empty() {
            return Ok(AnalysisOutcome::Clarification(
                "What would you like me to do?".to_string(),
            ));
        }
        if clauses.len() == 1 && clauses[0].split_whitespace().count() < 2 {
            return Ok(AnalysisOutcome::Clarification(format!(
                "Could you say a bit more about what \"{}\" should involve?",
                clauses[0]
            )));
        }

        let steps: Vec<Step> = clauses.into_iter().map(Step::new).collect();
        let rationale = match steps.len() {
            1 => "I'll do this in a single step:".to_string(),
            n => format!("I split your request into {} steps:", n),
        };
        Ok(AnalysisOutcome::Plan(Plan::new(raw_input, steps, rationale)))
    }
}

/// Pretends to run each step: reports progress, takes `step_duration`, and
/// stops early when cancelled.
///
/// Steps whose name contains "fail" always fail; steps containing "flaky"
/// fail on their first attempt only.
pub struct SimulatedStepExecutor {
    step_duration: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl SimulatedStepExecutor {
    pub fn new(step_duration: Duration) -> Self {
        Self {
            step_duration,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn record_attempt(&self, name: &str) -> u32 {
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attempts.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

impl Default for SimulatedStepExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait]
impl StepExecutor for SimulatedStepExecutor {
    async fn execute(
        &self,
        step: &Step,
        cancel: CancellationToken,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        let attempt = self.record_attempt(&step.name);
        let lower = step.name.to_lowercase();

        let _ = progress.send(format!("working on {}", step.name));
        tokio::select! {
            _ = tokio::time::sleep(self.step_duration) => {}
            _ = cancel.cancelled() => return Err(anyhow!("stopped: cancellation requested")),
        }

        if lower.contains("fail") {
            return Err(anyhow!("simulated failure in '{}'", step.name));
        }
        if lower.contains("flaky") && attempt == 1 {
            return Err(anyhow!("simulated transient fault in '{}'", step.name));
        }
        Ok(())
    }
}

/// Offers the same three generic alternatives for any failed step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticFailureAnalyzer;

#[async_trait]
impl FailureAnalyzer for StaticFailureAnalyzer {
    async fn analyze_failure(&self, step: &Step, error: &str) -> Result<Vec<String>> {
        tracing::debug!(step = %step.name, reason = %error, "static failure analysis");
        Ok(vec![
            format!("{} with more time", step.name),
            format!("skip {} and continue", step.name),
            format!("break {} into smaller steps", step.name),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn plan_for(request: &str) -> AnalysisOutcome {
        LocalPlanner.analyze(request, &[]).await.unwrap()
    }

    #[tokio::test]
    async fn test_planner_splits_on_then_semicolon_and_newline() {
        match plan_for("build the app, then run the tests; deploy to staging\nand notify the team").await {
            AnalysisOutcome::Plan(plan) => {
                let names: Vec<&str> = plan.steps.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(
                    names,
                    vec!["build the app", "run the tests", "deploy to staging", "notify the team"]
                );
                assert!(plan.rationale.contains("4 steps"));
            }
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_planner_asks_for_detail_on_one_word() {
        assert!(matches!(
            plan_for("deploy").await,
            AnalysisOutcome::Clarification(_)
        ));
        assert!(matches!(
            plan_for(" ; then ").await,
            AnalysisOutcome::Clarification(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_executor_flaky_then_ok() {
        let executor = SimulatedStepExecutor::new(Duration::from_millis(10));
        let step = Step::new("flaky upload");
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(executor.execute(&step, CancellationToken::new(), tx.clone()).await.is_err());
        assert!(executor.execute(&step, CancellationToken::new(), tx).await.is_ok());
        assert_eq!(rx.recv().await.as_deref(), Some("working on flaky upload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_executor_stops_on_cancel() {
        let executor = SimulatedStepExecutor::new(Duration::from_secs(60));
        let token = CancellationToken::new();
        token.cancel();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = executor.execute(&Step::new("long job"), token, tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_static_analyzer_offers_alternatives() {
        let alternatives = StaticFailureAnalyzer
            .analyze_failure(&Step::new("deploy"), "boom")
            .await
            .unwrap();
        assert_eq!(alternatives.len(), 3);
        assert!(alternatives[0].contains("deploy"));
    }
}
