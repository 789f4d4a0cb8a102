//! Session domain module.
//!
//! # Module Structure
//!
//! - `message`: Conversation turn types (`Turn`, `TurnRole`)
//! - `app_mode`: State machine states (`SessionState`)
//! - `model`: Per-session context (`SessionContext`)
//! - `user_input`: Parsed input and intents (`UserInput`, `Intent`)
//! - `checkpoint`: Durable snapshot (`Checkpoint`, `CheckpointId`)
//! - `repository`: Persistence gateway trait (`CheckpointRepository`)

mod app_mode;
mod checkpoint;
mod message;
mod model;
mod repository;
mod user_input;

// Re-export public API
pub use app_mode::SessionState;
pub use checkpoint::{Checkpoint, CheckpointId};
pub use message::{META_INTENT, META_KIND, META_STEP, META_STEP_STATUS, Turn, TurnRole};
pub use model::SessionContext;
pub use repository::CheckpointRepository;
pub use user_input::{Intent, UserInput};
