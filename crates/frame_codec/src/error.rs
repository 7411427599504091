use thiserror::Error;

/// Frame-level decode/encode failures
///
/// Per-field decode problems are not errors; they become
/// `FieldValue::Invalid` inside the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("sync word mismatch: expected {expected:#06X}, got {actual:#06X}")]
    SyncMismatch { expected: u64, actual: u64 },

    #[error("record has {actual} values, schema declares {expected}")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("cannot encode field '{field}': {reason}")]
    EncodingError { field: String, reason: String },

    #[error("encoded frame is {actual} bytes, schema declares {expected}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    #[error("invalid schema: {0}")]
    Schema(String),
}

impl FrameError {
    pub(crate) fn encoding(field: &str, reason: impl Into<String>) -> Self {
        Self::EncodingError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FrameTooShort { .. } => "too_short",
            Self::SyncMismatch { .. } => "sync_mismatch",
            Self::FieldCountMismatch { .. } => "field_count",
            Self::EncodingError { .. } => "encoding",
            Self::FrameLengthMismatch { .. } => "frame_length",
            Self::Schema(_) => "schema",
        }
    }
}
