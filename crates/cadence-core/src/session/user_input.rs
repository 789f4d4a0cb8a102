//! Classified user input.

use std::fmt;

/// Raw input split into slash commands and conversational text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// `/name arg1 arg2`
    Command { name: String, args: Vec<String> },
    /// Anything else, trimmed.
    Dialogue(String),
}

impl UserInput {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or_default().to_lowercase();
            let args = parts.map(str::to_string).collect();
            UserInput::Command { name, args }
        } else {
            UserInput::Dialogue(trimmed.to_string())
        }
    }
}

/// The closed set of intents a dialogue turn is classified into before any
/// branching happens in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    NewRequest,
    Affirmative,
    Negative,
    FollowUp,
    Ambiguous,
    /// Picks the 1-based alternative offered after an escalated failure.
    AcceptAlternative(usize),
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::NewRequest => write!(f, "new_request"),
            Intent::Affirmative => write!(f, "affirmative"),
            Intent::Negative => write!(f, "negative"),
            Intent::FollowUp => write!(f, "follow_up"),
            Intent::Ambiguous => write!(f, "ambiguous"),
            Intent::AcceptAlternative(n) => write!(f, "accept_alternative:{}", n),
        }
    }
}
