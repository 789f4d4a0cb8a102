use std::borrow::Cow::{self, Borrowed, Owned};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cadence_core::config::CadenceConfig;
use cadence_core::error::RecoverableLoadError;
use cadence_core::session::CheckpointRepository;
use cadence_execution::ExecutionPipeline;
use cadence_infrastructure::{CadencePaths, ConfigService, TomlCheckpointRepository};
use cadence_interaction::commands::COMMAND_NAMES;
use cadence_interaction::local_agents::{LocalPlanner, SimulatedStepExecutor, StaticFailureAnalyzer};
use cadence_interaction::{SessionOutput, SessionStateMachine, TurnOutcome};

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Conversational plan, confirm and execute")]
struct Args {
    /// Config file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Session name; each name keeps its own checkpoint.
    #[arg(long, value_name = "NAME")]
    session: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMAND_NAMES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

/// Asks the reader thread for one line.
struct Prompt {
    text: String,
    /// Whether the answer goes into the readline history.
    remember: bool,
}

impl Prompt {
    fn input() -> Self {
        Self {
            text: ">> ".to_string(),
            remember: true,
        }
    }

    fn question(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            remember: false,
        }
    }
}

enum ReadEvent {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Owns the rustyline editor. Reads one line per prompt request and stops
/// when the prompt channel closes or input ends.
fn reader_loop(
    mut prompts: mpsc::UnboundedReceiver<Prompt>,
    events: mpsc::UnboundedSender<ReadEvent>,
    history_file: Option<PathBuf>,
) {
    let mut rl = match Editor::<CliHelper, DefaultHistory>::new() {
        Ok(rl) => rl,
        Err(e) => {
            let _ = events.send(ReadEvent::Failed(e.to_string()));
            return;
        }
    };
    rl.set_helper(Some(CliHelper::new()));
    if let Some(path) = &history_file {
        // Missing on first run.
        let _ = rl.load_history(path);
    }

    while let Some(prompt) = prompts.blocking_recv() {
        let event = match rl.readline(&prompt.text) {
            Ok(line) => {
                if prompt.remember && !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                ReadEvent::Line(line)
            }
            Err(ReadlineError::Interrupted) => ReadEvent::Interrupted,
            Err(ReadlineError::Eof) => ReadEvent::Eof,
            Err(e) => ReadEvent::Failed(e.to_string()),
        };
        let finished = !matches!(event, ReadEvent::Line(_));
        if events.send(event).is_err() || finished {
            break;
        }
    }

    if let Some(path) = &history_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), reason = %e, "could not save readline history");
        }
    }
}

fn render(output: SessionOutput) {
    match output {
        SessionOutput::Reply(text) => {
            for line in text.lines() {
                println!("{}", line.bright_blue());
            }
        }
        SessionOutput::PlanProposed(plan) => {
            for line in plan.summary().lines() {
                println!("{}", line.bright_yellow());
            }
        }
        SessionOutput::Progress(text) => {
            for line in text.lines() {
                println!("{}", line.cyan());
            }
        }
        SessionOutput::Warning(text) => {
            eprintln!("{}", format!("warning: {}", text).yellow());
        }
        SessionOutput::Notice(text) => {
            for line in text.lines() {
                println!("{}", line.bright_black());
            }
        }
    }
}

/// Awaits `work` while printing session output as it arrives.
/// What to tell the user after a Ctrl-C that arrived away from the prompt.
/// Without a running plan the only thing in flight is analysis, which is not
/// interruptible.
fn interrupt_notice(cancelled_run: bool) -> &'static str {
    if cancelled_run {
        "Cancelling..."
    } else {
        "Analysis in progress; Ctrl-C at the prompt exits."
    }
}

async fn drive<F: Future>(work: F, output: &mut mpsc::UnboundedReceiver<SessionOutput>) -> F::Output {
    tokio::pin!(work);
    loop {
        tokio::select! {
            result = &mut work => {
                while let Ok(pending) = output.try_recv() {
                    render(pending);
                }
                return result;
            }
            Some(next) = output.recv() => render(next),
        }
    }
}

/// Logs go to a daily file under the data dir; the terminal belongs to the REPL.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let log_dir = match CadencePaths::log_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{}", format!("Logging disabled: {}", e).yellow());
            return None;
        }
    };
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "{}",
            format!("Logging disabled: cannot create {}: {}", log_dir.display(), e).yellow()
        );
        return None;
    }

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("CADENCE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "cadence={level},cadence_core={level},cadence_infrastructure={level},cadence_execution={level},cadence_interaction={level}"
            ))
        });

    let file_appender = tracing_appender::rolling::daily(&log_dir, "cadence.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Some(guard)
}

fn load_config(args: &Args) -> Result<CadenceConfig> {
    let service = ConfigService::new(args.config.as_deref())?;
    let mut config = service
        .load()
        .with_context(|| format!("Failed to load {}", service.path().display()))?;
    if let Some(name) = &args.session {
        config.storage.session_name = name.clone();
    }
    Ok(config)
}

/// The entry point for the cadence REPL.
///
/// Wires the session state machine to the local collaborators, offers to
/// resume the last checkpoint, then reads lines until exit. The inactivity
/// timer only runs while the prompt is waiting.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.verbose);
    let config = load_config(&args)?;

    // ===== Backend Initialization =====
    let session_dir = CadencePaths::session_dir(&config)?;
    let repository: Arc<dyn CheckpointRepository> = Arc::new(TomlCheckpointRepository::new(
        session_dir,
        config.storage.session_name.clone(),
    ));
    let pipeline = Arc::new(ExecutionPipeline::new(
        Arc::new(SimulatedStepExecutor::default()),
        Arc::new(StaticFailureAnalyzer),
        &config.execution,
    ));
    let idle_timeout = config.session.idle_timeout();
    let session_name = config.storage.session_name.clone();

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<SessionOutput>();
    let mut machine = SessionStateMachine::new(
        config,
        Arc::new(LocalPlanner),
        pipeline,
        Arc::clone(&repository),
        output_tx,
    );
    tracing::info!(session = %session_name, "session started");

    // Ctrl-C outside the prompt cancels the running plan.
    let cancel = machine.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", interrupt_notice(cancel.cancel_active()).yellow());
        }
    });

    // ===== REPL Setup =====
    let (prompt_tx, prompt_rx) = mpsc::unbounded_channel::<Prompt>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ReadEvent>();
    let history_file = CadencePaths::readline_history_file().ok();
    let reader = tokio::task::spawn_blocking(move || reader_loop(prompt_rx, event_tx, history_file));

    println!("{}", "=== cadence ===".bright_magenta().bold());
    println!(
        "{}",
        format!("Session '{}'. Describe what you need, or type /help.", session_name).bright_black()
    );
    println!();

    // ===== Recovery Offer =====
    match repository.load().await {
        Ok(checkpoint) if !checkpoint.history.is_empty() || checkpoint.session_context.has_pending() => {
            println!(
                "{}",
                format!(
                    "Found a saved session from {} ({} turns).",
                    checkpoint.saved_at,
                    checkpoint.history.len()
                )
                .bright_yellow()
            );
            let _ = prompt_tx.send(Prompt::question("Resume it? [Y/n] "));
            match event_rx.recv().await {
                Some(ReadEvent::Line(answer)) => {
                    let answer = answer.trim().to_lowercase();
                    if answer.is_empty() || answer.starts_with('y') {
                        machine.restore(checkpoint);
                        while let Ok(pending) = output_rx.try_recv() {
                            render(pending);
                        }
                    } else {
                        println!("{}", "Starting fresh.".bright_black());
                    }
                }
                _ => {
                    drop(prompt_tx);
                    let _ = reader.await;
                    return Ok(());
                }
            }
        }
        Ok(_) | Err(RecoverableLoadError::NotFound) => {}
        Err(RecoverableLoadError::Malformed { reason }) => {
            eprintln!(
                "{}",
                format!("The saved session could not be read ({}). Starting fresh.", reason).yellow()
            );
        }
    }

    // ===== Main REPL Loop =====
    let mut awaiting_line = false;
    loop {
        if !awaiting_line {
            if prompt_tx.send(Prompt::input()).is_err() {
                break;
            }
            awaiting_line = true;
        }

        let event = match timeout(idle_timeout, event_rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // The prompt stays up; only the session reacts.
                drive(machine.handle_idle_timeout(), &mut output_rx).await;
                continue;
            }
        };
        awaiting_line = false;

        match event {
            ReadEvent::Line(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
                    break;
                }

                println!("{}", format!("> {}", trimmed).green());
                if drive(machine.handle_input(trimmed), &mut output_rx).await == TurnOutcome::Exit {
                    break;
                }
            }
            ReadEvent::Interrupted => {
                println!("{}", "CTRL-C detected. Exiting...".bright_green());
                break;
            }
            ReadEvent::Eof => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            ReadEvent::Failed(e) => {
                eprintln!("{}", format!("Error: {}", e).red());
                break;
            }
        }
    }

    // ===== Shutdown =====
    let summary = drive(machine.shutdown(), &mut output_rx).await;
    for line in summary.to_string().lines() {
        println!("{}", line.bright_green());
    }
    for warning in summary.stats.warnings() {
        tracing::warn!(%warning, "memory advisory at exit");
    }

    drop(prompt_tx);
    let _ = reader.await;

    println!("{}", "Goodbye!".bright_green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_notice_confirms_cancellation_of_running_plan() {
        assert_eq!(interrupt_notice(true), "Cancelling...");
    }

    #[test]
    fn test_interrupt_during_analysis_is_not_silent() {
        let notice = interrupt_notice(false);
        assert!(notice.contains("Analysis in progress"));
        assert!(notice.contains("Ctrl-C at the prompt exits"));
    }
}
