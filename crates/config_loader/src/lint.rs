//! 非致命配置问题
//!
//! 校验通过后仍值得提示的配置，作为值返回，由调用方决定如何呈现。

use std::fmt;

use contracts::{HandlerType, TelemetryBlueprint};

/// A configuration that loads but probably does not do what was meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No field carries `is_sync_word`: every frame is accepted
    NoSyncField,
    /// Checksum field present; it is decoded but never verified
    ChecksumNotVerified { field: String },
    /// Declared fields leave part of the frame undecoded
    UncoveredBytes { covered: usize, total: usize },
    /// No `[[handlers]]`: console + file defaults are used
    DefaultHandlers,
    /// `max_frames = 0`: the relay runs until stopped
    Unbounded,
    /// `source_timestamp_field` names no schema field
    MissingTimestampField { field: String },
    /// Several broadcast handlers, each needs its own address
    MultipleBroadcast { count: usize },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSyncField => {
                write!(f, "No sync field declared - frames will not be sync-checked")
            }
            Self::ChecksumNotVerified { field } => {
                write!(f, "Checksum field '{field}' is decoded but not verified")
            }
            Self::UncoveredBytes { covered, total } => write!(
                f,
                "Fields cover {covered} of {total} bytes - remaining bytes are ignored"
            ),
            Self::DefaultHandlers => {
                write!(f, "No handlers configured - using default console + file handlers")
            }
            Self::Unbounded => write!(f, "pipeline.max_frames is 0 - relay runs until stopped"),
            Self::MissingTimestampField { field } => write!(
                f,
                "pipeline.source_timestamp_field '{field}' is not a schema field - records carry no source timestamp"
            ),
            Self::MultipleBroadcast { count } => write!(
                f,
                "{count} broadcast handlers - each needs its own addr"
            ),
        }
    }
}

/// 收集已通过校验的配置上的警告
pub fn lint(blueprint: &TelemetryBlueprint) -> Vec<ConfigWarning> {
    let schema = &blueprint.schema;
    let mut warnings = Vec::new();

    if schema.sync_field().is_none() {
        warnings.push(ConfigWarning::NoSyncField);
    }

    if let Some(checksum) = schema.checksum_field() {
        warnings.push(ConfigWarning::ChecksumNotVerified {
            field: checksum.name.to_string(),
        });
    }

    let mut covered = vec![false; schema.total_length];
    for field in &schema.fields {
        if let Some(bytes) = field.end().and_then(|end| covered.get_mut(field.offset..end)) {
            bytes.fill(true);
        }
    }
    let covered = covered.iter().filter(|&&b| b).count();
    if covered < schema.total_length {
        warnings.push(ConfigWarning::UncoveredBytes {
            covered,
            total: schema.total_length,
        });
    }

    if blueprint.handlers.is_empty() {
        warnings.push(ConfigWarning::DefaultHandlers);
    }

    if blueprint.pipeline.max_frames == 0 {
        warnings.push(ConfigWarning::Unbounded);
    }

    let ts = blueprint.pipeline.source_timestamp_field.as_str();
    if !schema.fields.iter().any(|f| f.name.as_str() == ts) {
        warnings.push(ConfigWarning::MissingTimestampField {
            field: ts.to_string(),
        });
    }

    let broadcasts = blueprint
        .effective_handlers()
        .iter()
        .filter(|h| h.handler_type == HandlerType::Broadcast)
        .count();
    if broadcasts > 1 {
        warnings.push(ConfigWarning::MultipleBroadcast { count: broadcasts });
    }

    warnings
}
