//! Conversation handling for cadence: intent classification, the
//! confirmation state machine, slash commands and the built-in local
//! collaborators.

pub mod commands;
pub mod intent;
pub mod local_agents;
pub mod state_machine;

pub use intent::{IntentClassifier, PhraseIntentClassifier};
pub use state_machine::{CancelHandle, SessionOutput, SessionStateMachine, SessionSummary, TurnOutcome};
