//! Domain layer for cadence: turns, bounded history, plans, session state,
//! the checkpoint model and the traits the outer crates implement.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod history;
pub mod plan;
pub mod session;

// Re-export common error type
pub use error::{CadenceError, RecoverableLoadError};
