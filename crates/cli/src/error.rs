//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Replay recording could not be loaded
    #[error("Failed to load replay file {path}: {message}")]
    ReplayLoad { path: String, message: String },

    /// Source selection incomplete
    #[error("Invalid source options: {message}")]
    SourceOptions { message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn replay_load(path: &Path, message: impl Into<String>) -> Self {
        Self::ReplayLoad {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn source_options(message: impl Into<String>) -> Self {
        Self::SourceOptions {
            message: message.into(),
        }
    }
}
