//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every registered handler failed its setup
    #[error("no active handlers: every registered handler failed setup")]
    NoActiveHandlers,

    /// Handler could not be built from its configuration
    #[error("failed to create handler '{name}': {message}")]
    HandlerCreation { name: String, message: String },

    /// A background task did not finish within its grace period
    #[error("{component} did not stop within {grace_ms} ms, aborted")]
    ShutdownTimeout { component: String, grace_ms: u64 },

    /// Error reported by a handler or a contract type
    #[error("handler error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Create a handler creation error
    pub fn handler_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn shutdown_timeout(component: impl Into<String>, grace: std::time::Duration) -> Self {
        Self::ShutdownTimeout {
            component: component.into(),
            grace_ms: grace.as_millis() as u64,
        }
    }
}
