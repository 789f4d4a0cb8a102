//! The session state machine.
//!
//! Owns the history and session context for one user, classifies each
//! dialogue turn into an [`Intent`], and moves between `Idle`,
//! `AwaitingConfirmation` and `Executing`. Everything user-visible is sent
//! on the output channel as it happens; the caller renders it.

use crate::commands::SlashCommand;
use crate::intent::{IntentClassifier, PhraseIntentClassifier};
use async_trait::async_trait;
use cadence_core::collaborator::{AnalysisOutcome, AnalysisService};
use cadence_core::config::CadenceConfig;
use cadence_core::error::{CadenceError, Result};
use cadence_core::history::{HistoryStore, MemoryStats};
use cadence_core::plan::{Plan, Step};
use cadence_core::session::{
    Checkpoint, CheckpointId, CheckpointRepository, Intent, META_INTENT, META_KIND, META_STEP,
    META_STEP_STATUS, SessionContext, SessionState, Turn, UserInput,
};
use cadence_execution::{
    CancellationController, ExecutionPipeline, PipelineEvent, PipelineObserver, PipelineStatus,
};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Something the user should see, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    /// Conversational reply.
    Reply(String),
    /// A plan proposed for confirmation.
    PlanProposed(Plan),
    /// Pipeline progress line.
    Progress(String),
    /// Advisory problem that does not stop the session.
    Warning(String),
    /// Command output; not part of the conversation.
    Notice(String),
}

/// Whether the caller should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Exit,
}

/// Lets another task (the interrupt handler) cancel the running plan.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    active: Arc<Mutex<Option<CancellationController>>>,
}

impl CancelHandle {
    /// Requests cancellation of the running plan. Returns false when nothing runs.
    pub fn cancel_active(&self) -> bool {
        match self.slot().as_ref() {
            Some(controller) => {
                controller.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    fn set(&self, controller: Option<CancellationController>) {
        *self.slot() = controller;
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationController>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Report printed when the session ends.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stats: MemoryStats,
    pub checkpoint: Option<CheckpointId>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns kept (capacity {}, {:.0}% used, ~{} bytes)",
            self.stats.turn_count, self.stats.max_turns, self.stats.usage_percent, self.stats.approx_bytes
        )?;
        for warning in self.stats.warnings() {
            write!(f, "\n{}", warning)?;
        }
        match &self.checkpoint {
            Some(id) => write!(f, "\nSaved checkpoint {}", id),
            None => write!(f, "\nThe final checkpoint could not be written"),
        }
    }
}

/// History, context and persistence for one session.
///
/// Split out of the state machine so the pipeline observer can borrow it
/// while the machine drives a run.
struct Journal {
    history: HistoryStore,
    context: SessionContext,
    repository: Arc<dyn CheckpointRepository>,
    output: mpsc::UnboundedSender<SessionOutput>,
    /// Set after a failed write so the warning is shown once per outage.
    persistence_degraded: bool,
}

impl Journal {
    fn emit(&self, output: SessionOutput) {
        // The receiver going away only means nobody is rendering.
        let _ = self.output.send(output);
    }

    fn record(&mut self, turn: Turn, output: SessionOutput) {
        self.history.append(turn);
        self.emit(output);
    }

    fn reply(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.record(
            Turn::assistant(text.clone()).with_metadata(META_KIND, "reply"),
            SessionOutput::Reply(text),
        );
    }

    fn snapshot(&self) -> Checkpoint {
        Checkpoint::new(
            self.history.turns().to_vec(),
            self.context.clone(),
            self.history.memory_usage(),
        )
    }

    /// Best effort: a failed write is logged and surfaced once as a warning.
    async fn checkpoint(&mut self) -> Option<CheckpointId> {
        let checkpoint = self.snapshot();
        match self.repository.save(&checkpoint).await {
            Ok(id) => {
                if self.persistence_degraded {
                    tracing::info!(checkpoint = %id, "checkpoint writes recovered");
                    self.persistence_degraded = false;
                }
                Some(id)
            }
            Err(e) => {
                tracing::error!(reason = %e, turns = checkpoint.history.len(), "checkpoint write failed");
                if !self.persistence_degraded {
                    self.persistence_degraded = true;
                    let text = format!(
                        "Could not save the session ({}). You can keep going; saving will be retried.",
                        e
                    );
                    self.record(
                        Turn::assistant(text.clone()).with_metadata(META_KIND, "warning"),
                        SessionOutput::Warning(text),
                    );
                }
                None
            }
        }
    }
}

/// Observer that writes pipeline progress into the journal.
struct SessionRecorder<'a> {
    journal: &'a mut Journal,
}

#[async_trait]
impl PipelineObserver for SessionRecorder<'_> {
    async fn on_event(&mut self, event: PipelineEvent, steps: &[Step]) {
        if let Some(plan) = self.journal.context.pending_operation.as_mut() {
            plan.steps = steps.to_vec();
        }

        let line = event.to_string();
        match &event {
            // Liveness only; kept out of the history.
            PipelineEvent::Heartbeat { .. } => self.journal.emit(SessionOutput::Progress(line)),
            _ => {
                let mut turn = Turn::assistant(line.clone()).with_metadata(META_KIND, "progress");
                if let Some(name) = event.step_name() {
                    turn = turn.with_metadata(META_STEP, name);
                    if let Some(step) = steps.iter().find(|s| s.name == name) {
                        turn = turn.with_metadata(META_STEP_STATUS, step.status().to_string());
                    }
                }
                self.journal.record(turn, SessionOutput::Progress(line));
            }
        }

        if event.is_checkpoint_boundary() {
            self.journal.checkpoint().await;
        }
    }
}

/// The confirmation/intent state machine for one session.
pub struct SessionStateMachine {
    journal: Journal,
    state: SessionState,
    analysis: Arc<dyn AnalysisService>,
    pipeline: Arc<ExecutionPipeline>,
    classifier: Box<dyn IntentClassifier>,
    config: CadenceConfig,
    cancel: CancelHandle,
    /// Alternatives offered by the last escalation, open until the next dialogue turn.
    alternatives: Vec<String>,
    idle_strikes: u32,
}

impl SessionStateMachine {
    pub fn new(
        config: CadenceConfig,
        analysis: Arc<dyn AnalysisService>,
        pipeline: Arc<ExecutionPipeline>,
        repository: Arc<dyn CheckpointRepository>,
        output: mpsc::UnboundedSender<SessionOutput>,
    ) -> Self {
        Self {
            journal: Journal {
                history: HistoryStore::new(config.history.clone()),
                context: SessionContext::default(),
                repository,
                output,
                persistence_degraded: false,
            },
            state: SessionState::Idle,
            analysis,
            pipeline,
            classifier: Box::new(PhraseIntentClassifier),
            config,
            cancel: CancelHandle::default(),
            alternatives: Vec::new(),
            idle_strikes: 0,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.journal.context
    }

    pub fn history(&self) -> &HistoryStore {
        &self.journal.history
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The controller of the run in progress, if any.
    pub fn active_controller(&self) -> Option<CancellationController> {
        self.cancel.slot().clone()
    }

    /// Replaces the empty session with a recovered checkpoint.
    ///
    /// A plan that was pending or mid-run comes back awaiting confirmation,
    /// with its steps reset.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        let turns = checkpoint.history.len();
        self.journal.history = HistoryStore::from_turns(self.config.history.clone(), checkpoint.history);
        self.journal.context = checkpoint.session_context;
        self.alternatives.clear();
        self.idle_strikes = 0;

        let pending = self.journal.context.pending_operation.take().map(|plan| Plan {
            steps: plan.fresh_steps(),
            ..plan
        });
        tracing::info!(turns, pending = pending.is_some(), saved_at = %checkpoint.saved_at, "session restored");

        match pending {
            Some(plan) => {
                self.journal.emit(SessionOutput::Notice(format!(
                    "Restored {} turns. This plan was still pending:",
                    turns
                )));
                self.propose(plan);
            }
            None => {
                self.state = SessionState::Idle;
                self.journal
                    .emit(SessionOutput::Notice(format!("Restored {} turns.", turns)));
            }
        }
    }

    /// Handles one line of input.
    pub async fn handle_input(&mut self, raw: &str) -> TurnOutcome {
        self.idle_strikes = 0;

        match UserInput::parse(raw) {
            UserInput::Command { name, args } => {
                self.handle_command(SlashCommand::parse(&name, &args)).await
            }
            UserInput::Dialogue(text) => {
                if text.is_empty() {
                    return TurnOutcome::Continue;
                }
                self.handle_dialogue(text).await;
                TurnOutcome::Continue
            }
        }
    }

    /// Called when the inactivity window expires with no input.
    ///
    /// The first expiry asks whether the user is still there; a second one
    /// while a plan awaits confirmation discards it.
    pub async fn handle_idle_timeout(&mut self) {
        self.idle_strikes += 1;
        match self.idle_strikes {
            1 => {
                self.journal.reply("Are you still there?");
            }
            2 if self.state.is_awaiting_confirmation() => {
                self.discard_pending();
                tracing::info!("pending plan discarded after inactivity");
                self.journal
                    .reply("No answer, so I've discarded the pending plan.");
                self.journal.checkpoint().await;
            }
            _ => {}
        }
    }

    /// Writes the final checkpoint and reports memory usage.
    pub async fn shutdown(&mut self) -> SessionSummary {
        let checkpoint = self.journal.checkpoint().await;
        let stats = self.journal.history.memory_usage();
        tracing::info!(turns = stats.turn_count, usage_percent = stats.usage_percent, "session ended");
        SessionSummary { stats, checkpoint }
    }

    async fn handle_dialogue(&mut self, text: String) {
        let intent = self
            .classifier
            .classify(&text, &self.state, self.alternatives.len());
        tracing::debug!(intent = %intent, state = %self.state, "classified turn");

        self.journal.history.append(
            Turn::user(text.clone()).with_metadata(META_INTENT, intent.to_string()),
        );
        self.journal.checkpoint().await;

        let offered = std::mem::take(&mut self.alternatives);

        match (self.state.clone(), intent) {
            (SessionState::Idle, Intent::AcceptAlternative(n)) => match offered.get(n.wrapping_sub(1)) {
                Some(alternative) => {
                    let request = alternative.clone();
                    self.journal
                        .reply(format!("Let's try: {}", request));
                    self.analyze_new_request(&request).await;
                }
                None => {
                    self.journal.reply(format!(
                        "There is no alternative {}. Pick a number from 1 to {}.",
                        n,
                        offered.len()
                    ));
                    self.alternatives = offered;
                }
            },
            (SessionState::Idle, Intent::Ambiguous) => {
                self.journal
                    .reply("There's nothing pending to confirm. What would you like to do?");
            }
            (SessionState::Idle, _) => {
                self.analyze_new_request(&text).await;
            }
            (SessionState::AwaitingConfirmation { plan }, Intent::Affirmative) => {
                self.execute(plan).await;
            }
            (SessionState::AwaitingConfirmation { .. }, Intent::Negative) => {
                self.discard_pending();
                self.journal.reply("Okay, I've discarded that plan.");
            }
            (SessionState::AwaitingConfirmation { plan }, Intent::FollowUp) => {
                self.augment_pending(plan, &text).await;
            }
            (SessionState::AwaitingConfirmation { .. }, _) => {
                self.journal
                    .reply("Please answer yes to run the plan, no to discard it, or add to it.");
            }
            (SessionState::Executing { .. }, _) => {
                // Input is not read while a plan runs; reaching this means a
                // caller drove the machine concurrently.
                tracing::warn!("input received while executing");
                self.journal
                    .reply("A plan is still running. Press Ctrl-C to cancel it.");
            }
        }

        self.journal.checkpoint().await;
    }

    async fn handle_command(&mut self, command: SlashCommand) -> TurnOutcome {
        match command {
            SlashCommand::Help => {
                self.journal
                    .emit(SessionOutput::Notice(SlashCommand::help_text().to_string()));
            }
            SlashCommand::Status => {
                let notice = self.status_text();
                self.journal.emit(SessionOutput::Notice(notice));
            }
            SlashCommand::History(n) => {
                let lines: Vec<String> = self
                    .journal
                    .history
                    .recent(n)
                    .iter()
                    .map(|t| format!("[{}] {}", t.role, t.content))
                    .collect();
                let notice = if lines.is_empty() {
                    "No turns yet.".to_string()
                } else {
                    lines.join("\n")
                };
                self.journal.emit(SessionOutput::Notice(notice));
            }
            SlashCommand::Epic(reference) => {
                let notice = match &reference {
                    Some(r) => format!("Current epic set to {}.", r),
                    None => "Current epic cleared.".to_string(),
                };
                self.journal.context.current_epic_ref = reference;
                self.journal.emit(SessionOutput::Notice(notice));
                self.journal.checkpoint().await;
            }
            SlashCommand::Story(reference) => {
                let notice = match &reference {
                    Some(r) => format!("Current story set to {}.", r),
                    None => "Current story cleared.".to_string(),
                };
                self.journal.context.current_story_ref = reference;
                self.journal.emit(SessionOutput::Notice(notice));
                self.journal.checkpoint().await;
            }
            SlashCommand::Clear => {
                let dropped = self.journal.history.clear_conversation();
                self.discard_pending();
                self.alternatives.clear();
                self.journal.emit(SessionOutput::Notice(format!(
                    "Cleared {} turns and any pending plan.",
                    dropped
                )));
                self.journal.checkpoint().await;
            }
            SlashCommand::Exit => return TurnOutcome::Exit,
            SlashCommand::Unknown(name) => {
                self.journal.emit(SessionOutput::Notice(format!(
                    "Unknown command '/{}'. Type /help for the list.",
                    name
                )));
            }
        }
        TurnOutcome::Continue
    }

    fn status_text(&self) -> String {
        let context = &self.journal.context;
        let stats = self.journal.history.memory_usage();
        let mut lines = vec![
            format!("State: {}", self.state),
            format!(
                "Epic: {}",
                context.current_epic_ref.as_deref().unwrap_or("(none)")
            ),
            format!(
                "Story: {}",
                context.current_story_ref.as_deref().unwrap_or("(none)")
            ),
            format!(
                "History: {}/{} turns ({:.0}%), ~{} bytes",
                stats.turn_count, stats.max_turns, stats.usage_percent, stats.approx_bytes
            ),
        ];
        if let Some(plan) = &context.pending_operation {
            lines.push(format!("Pending plan: {} ({} steps)", plan.request, plan.steps.len()));
        }
        lines.extend(stats.warnings());
        lines.join("\n")
    }

    /// Runs analysis with the token-budgeted context and the configured timeout.
    async fn analyze(&self, request: &str) -> Result<AnalysisOutcome> {
        let context = self
            .journal
            .history
            .select_for_analysis(self.config.context.max_tokens);
        let timeout = self.config.session.analysis_timeout();

        let result = match tokio::time::timeout(timeout, self.analysis.analyze(request, &context)).await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(e)) => Err(CadenceError::analysis(format!("{:#}", e))),
            Err(_) => Err(CadenceError::analysis(format!(
                "no answer within {}s",
                timeout.as_secs()
            ))),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, context_turns = context.len(), "analysis failed");
        }
        result
    }

    async fn analyze_new_request(&mut self, request: &str) {
        match self.analyze(request).await {
            Ok(AnalysisOutcome::Plan(plan)) if !plan.steps.is_empty() => self.propose(plan),
            Ok(AnalysisOutcome::Plan(_)) => {
                self.journal
                    .reply("I couldn't find anything to do in that request. Could you rephrase it?");
            }
            Ok(AnalysisOutcome::Clarification(question)) => self.journal.reply(question),
            Err(_) => self.apologize(),
        }
    }

    /// Re-analyses the pending request extended with `addition`.
    async fn augment_pending(&mut self, plan: Plan, addition: &str) {
        let request = format!("{}\n{}", plan.request, addition);
        match self.analyze(&request).await {
            Ok(AnalysisOutcome::Plan(new_plan)) if !new_plan.steps.is_empty() => {
                self.propose(new_plan);
            }
            Ok(AnalysisOutcome::Plan(_)) => {
                self.journal
                    .reply("That addition didn't change the plan. Proceed? (yes/no)");
            }
            Ok(AnalysisOutcome::Clarification(question)) => self.journal.reply(question),
            Err(_) => {
                self.discard_pending();
                self.apologize();
            }
        }
    }

    fn apologize(&mut self) {
        self.state = SessionState::Idle;
        self.journal
            .reply("Sorry, I couldn't work out a plan for that. Could you rephrase it?");
    }

    fn propose(&mut self, plan: Plan) {
        let summary = plan.summary();
        self.journal.context.set_pending(plan.clone());
        self.state = SessionState::AwaitingConfirmation { plan: plan.clone() };
        self.journal.record(
            Turn::assistant(summary).with_metadata(META_KIND, "plan"),
            SessionOutput::PlanProposed(plan),
        );
    }

    fn discard_pending(&mut self) {
        self.journal.context.take_pending();
        self.state = SessionState::Idle;
    }

    async fn execute(&mut self, plan: Plan) {
        let total = plan.steps.len();
        let steps = plan.fresh_steps();
        tracing::info!(plan = %plan.id, steps = total, "executing plan");

        self.state = SessionState::Executing { plan: plan.clone() };
        let controller = self.pipeline.controller();
        self.cancel.set(Some(controller.clone()));

        let pipeline = Arc::clone(&self.pipeline);
        let report = {
            let mut recorder = SessionRecorder {
                journal: &mut self.journal,
            };
            pipeline.run(steps, &controller, &mut recorder).await
        };

        self.cancel.set(None);
        self.discard_pending();

        match report.status {
            PipelineStatus::Succeeded => {
                self.journal
                    .reply(format!("All {} steps completed.", total));
            }
            PipelineStatus::PartiallyFailed { alternatives, .. } => {
                self.alternatives = alternatives;
            }
            PipelineStatus::Cancelled => {
                self.journal
                    .reply("Stopped. Ready for your next request.");
            }
        }
    }
}
