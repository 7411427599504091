//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files (legacy JSON schema files included)
//! - Validate the frame schema and pipeline settings
//! - Report non-fatal problems as [`ConfigWarning`] values
//! - Generate `TelemetryBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("telemetry.toml")).unwrap();
//! println!("frame length: {}", blueprint.schema.total_length);
//! ```

mod lint;
mod parser;
mod validator;

pub use contracts::TelemetryBlueprint;
pub use lint::ConfigWarning;
pub use parser::ConfigFormat;
pub use validator::validate_schema;

use contracts::ContractError;
use std::path::Path;
use tracing::{debug, warn};

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<TelemetryBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        debug!(path = %path.display(), ?format, "loading telemetry config");
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TelemetryBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Non-fatal problems of a loaded configuration
    pub fn warnings(blueprint: &TelemetryBlueprint) -> Vec<ConfigWarning> {
        lint::lint(blueprint)
    }

    /// Serialize TelemetryBlueprint to TOML string
    pub fn to_toml(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize TelemetryBlueprint to JSON string
    pub fn to_json(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TelemetryBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        if blueprint.schema.sync_field().is_none() {
            warn!(warning = %ConfigWarning::NoSyncField, "accepting every frame");
        }
        Ok(blueprint)
    }
}
