//! Slash commands.
//!
//! Commands are handled before intent classification and never reach the
//! analysis collaborator.

/// A recognised slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Status,
    History(usize),
    Epic(Option<String>),
    Story(Option<String>),
    Clear,
    Exit,
    Unknown(String),
}

/// Turns shown by `/history` without an argument.
pub const DEFAULT_HISTORY_COUNT: usize = 10;

/// Names offered for completion by the readline front-end.
pub const COMMAND_NAMES: &[&str] = &[
    "/help", "/status", "/history", "/epic", "/story", "/clear", "/exit", "/quit",
];

impl SlashCommand {
    pub fn parse(name: &str, args: &[String]) -> Self {
        match name {
            "help" | "?" => SlashCommand::Help,
            "status" => SlashCommand::Status,
            "history" => {
                let count = args
                    .first()
                    .and_then(|a| a.parse::<usize>().ok())
                    .unwrap_or(DEFAULT_HISTORY_COUNT);
                SlashCommand::History(count)
            }
            "epic" => SlashCommand::Epic(args.first().cloned()),
            "story" => SlashCommand::Story(args.first().cloned()),
            "clear" => SlashCommand::Clear,
            "exit" | "quit" => SlashCommand::Exit,
            other => SlashCommand::Unknown(other.to_string()),
        }
    }

    pub fn help_text() -> &'static str {
        "\
Describe what you want done and cadence will propose a plan.
Answer yes to run it, no to discard it, or add to it (\"and then ...\").

Commands:
  /help           Show this help
  /status         Session state, references and memory usage
  /history [n]    Show the last n turns (default 10)
  /epic <ref>     Set the current epic (no argument clears it)
  /story <ref>    Set the current story (no argument clears it)
  /clear          Forget the conversation and any pending plan
  /exit, /quit    Save and leave

Ctrl-C while a plan runs cancels it."
    }
}
