pub mod config_service;
pub mod dto;
pub mod paths;
pub mod storage;
pub mod toml_checkpoint_repository;

pub use crate::config_service::ConfigService;
pub use crate::paths::CadencePaths;
pub use crate::toml_checkpoint_repository::TomlCheckpointRepository;
