//! Error types for predex
//!
//! All modules use `PredexResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for predex operations
pub type PredexResult<T> = Result<T, PredexError>;

/// All errors that can occur in predex
#[derive(Error, Debug)]
pub enum PredexError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    // Dex errors
    #[error("dx failed for {input}: {reason}")]
    Transform { input: PathBuf, reason: String },

    #[error("No dex files created at {0}")]
    NoDexOutput(PathBuf),

    #[error("Cached pre-dex result for {input} has no output files")]
    MissingCachedOutput { input: PathBuf },

    #[error("Input library not found: {0}")]
    InputNotFound(PathBuf),

    // Cache store errors
    #[error("Failed to write cache store {path}: {reason}")]
    StoreWrite { path: PathBuf, reason: String },

    #[error("Failed to read cache store {path}: {reason}")]
    StoreRead { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PredexError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandFailed { .. } => Some("Check build_tools.dx_path in: predex config path"),
            Self::InvalidRevision(_) => Some("Revisions look like 23.0.1 or 22.0.0 rc1"),
            Self::StoreRead { .. } => Some("Run: predex cache clear"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PredexError::NoDexOutput(PathBuf::from("/out/lib"));
        assert_eq!(err.to_string(), "No dex files created at /out/lib");
    }

    #[test]
    fn error_hint() {
        let err = PredexError::InvalidRevision("x".to_string());
        assert!(err.hint().is_some());
        assert!(PredexError::Internal("boom".to_string()).hint().is_none());
    }

    #[test]
    fn transform_display_includes_input() {
        let err = PredexError::Transform {
            input: PathBuf::from("libs/guava.jar"),
            reason: "exit code 2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("guava.jar"));
        assert!(msg.contains("exit code 2"));
    }
}
