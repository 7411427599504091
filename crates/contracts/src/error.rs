//! Layered error definitions
//!
//! Categorized by source: config / handler / source

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Handler Errors =====
    /// Handler could not acquire its resources
    #[error("handler '{handler}' setup error: {message}")]
    HandlerSetup { handler: String, message: String },

    /// Handler failed to deliver an envelope
    #[error("handler '{handler}' delivery error: {message}")]
    HandlerDelivery { handler: String, message: String },

    /// Handler shed the envelope because its own queue was full
    #[error("handler '{handler}' queue overflow, envelope dropped")]
    QueueOverflow { handler: String },

    // ===== Source Errors =====
    /// Frame source unavailable
    #[error("source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration parse error keeping the underlying cause
    pub fn config_parse_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn handler_setup(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerSetup {
            handler: handler.into(),
            message: message.into(),
        }
    }

    pub fn handler_delivery(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerDelivery {
            handler: handler.into(),
            message: message.into(),
        }
    }

    pub fn queue_overflow(handler: impl Into<String>) -> Self {
        Self::QueueOverflow {
            handler: handler.into(),
        }
    }

    /// 是否为队列溢出丢弃 (计入 dropped 而不是 failed)
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::QueueOverflow { .. })
    }

    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
