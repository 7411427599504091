//! FileLogHandler - appends one JSON line per envelope

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{ContractError, DeliveryMode, OutputHandler, RecordEnvelope};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Default JSONL output file
pub const DEFAULT_LOG_PATH: &str = "telemetry_log.jsonl";

/// Configuration for FileLogHandler
#[derive(Debug, Clone)]
pub struct FileLogConfig {
    /// Output file, opened in append mode
    pub path: PathBuf,
}

impl FileLogConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));
        Self { path }
    }
}

/// Handler that persists envelopes as JSON Lines
pub struct FileLogHandler {
    name: String,
    config: FileLogConfig,
    file: Option<File>,
    lines_written: u64,
}

impl FileLogHandler {
    pub fn new(name: impl Into<String>, config: FileLogConfig) -> Self {
        Self {
            name: name.into(),
            config,
            file: None,
            lines_written: 0,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        Self::new(name, FileLogConfig::from_params(params))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> ContractError {
        ContractError::handler_delivery(
            &self.name,
            format!("{action} {}: {e}", self.config.path.display()),
        )
    }
}

impl OutputHandler for FileLogHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Blocking
    }

    #[instrument(name = "file_handler_setup", skip(self), fields(handler = %self.name))]
    async fn setup(&mut self) -> Result<(), ContractError> {
        if let Some(parent) = self.config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ContractError::handler_setup(&self.name, format!("create {}: {e}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await
            .map_err(|e| {
                ContractError::handler_setup(
                    &self.name,
                    format!("open {}: {e}", self.config.path.display()),
                )
            })?;
        self.file = Some(file);
        debug!(handler = %self.name, path = %self.config.path.display(), "log file opened");
        Ok(())
    }

    async fn handle(&mut self, envelope: &RecordEnvelope) -> Result<(), ContractError> {
        let mut line = envelope.to_json()?;
        line.push('\n');

        let Some(file) = self.file.as_mut() else {
            return Err(ContractError::handler_delivery(&self.name, "log file not open"));
        };
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| self.io_error("write", e))?;
        self.lines_written += 1;
        Ok(())
    }

    #[instrument(name = "file_handler_teardown", skip(self), fields(handler = %self.name))]
    async fn teardown(&mut self) -> Result<(), ContractError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| self.io_error("flush", e))?;
            file.sync_all().await.map_err(|e| self.io_error("sync", e))?;
        }
        info!(handler = %self.name, lines = self.lines_written, "log file closed");
        Ok(())
    }
}
