//! Versioned persistence DTOs.

pub mod checkpoint;

pub use checkpoint::{CheckpointDTO, create_checkpoint_migrator};
