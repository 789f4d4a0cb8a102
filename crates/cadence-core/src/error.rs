//! Error types for the cadence session core.

use thiserror::Error;

/// A shared error type for the entire cadence workspace.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone)]
pub enum CadenceError {
    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// The analysis collaborator failed or timed out
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// A step status change that would move backwards
    #[error("Invalid step transition for '{step}': {from} -> {to}")]
    InvalidTransition {
        step: String,
        from: String,
        to: String,
    },
}

impl CadenceError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Serialization error
    pub fn serialization(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Analysis error
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Check if this is a serialization error
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for CadenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON", err.to_string())
    }
}

impl From<toml::de::Error> for CadenceError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization("TOML", err.to_string())
    }
}

impl From<toml::ser::Error> for CadenceError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization("TOML", err.to_string())
    }
}

impl From<version_migrate::MigrationError> for CadenceError {
    fn from(err: version_migrate::MigrationError) -> Self {
        use version_migrate::MigrationError;

        match err {
            MigrationError::EntityNotFound(id) => {
                Self::Migration(format!("no migration path registered for '{}'", id))
            }
            MigrationError::DeserializationError(_) | MigrationError::SerializationError(_) => {
                Self::serialization("migration", err.to_string())
            }
            MigrationError::TomlParseError(_) | MigrationError::TomlSerializeError(_) => {
                Self::serialization("TOML", err.to_string())
            }
            MigrationError::IoError { .. } => Self::Io {
                message: err.to_string(),
            },
            _ => Self::Migration(err.to_string()),
        }
    }
}

/// A type alias for `Result<T, CadenceError>`.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Why a checkpoint could not be restored.
///
/// Both variants mean the same thing to callers: start with an empty session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoverableLoadError {
    /// No checkpoint has been written yet.
    #[error("no checkpoint found")]
    NotFound,
    /// A checkpoint exists but failed structural validation.
    #[error("checkpoint is malformed: {reason}")]
    Malformed { reason: String },
}

impl RecoverableLoadError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion_keeps_kind() {
        let err: CadenceError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.is_io());
        assert!(err.to_string().contains("PermissionDenied"));
    }

    #[test]
    fn test_toml_error_is_serialization() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: CadenceError = parse.unwrap_err().into();
        assert!(err.is_serialization());
        assert!(err.to_string().contains("TOML"));
    }

    #[test]
    fn test_analysis_helper() {
        let err = CadenceError::analysis("no answer within 60s");
        assert!(matches!(err, CadenceError::Analysis(_)));
        assert_eq!(err.to_string(), "Analysis error: no answer within 60s");
    }
}
