//! ConsoleHandler - prints each envelope as a readable block on stdout

use std::collections::HashMap;
use std::fmt::Write as _;

use contracts::{ContractError, DeliveryMode, FieldValue, OutputHandler, RecordEnvelope};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Float digits when `precision` is not configured
pub const DEFAULT_PRECISION: usize = 2;

/// Handler that writes a human-readable block per envelope
pub struct ConsoleHandler {
    name: String,
    precision: usize,
    out: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ConsoleHandler {
    pub fn new(name: impl Into<String>, precision: usize) -> Self {
        Self::with_writer(name, precision, Box::new(tokio::io::stdout()))
    }

    pub fn with_writer(
        name: impl Into<String>,
        precision: usize,
        out: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            name: name.into(),
            precision,
            out,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let precision = match params.get("precision") {
            Some(raw) => raw
                .parse()
                .map_err(|e| format!("invalid precision '{raw}': {e}"))?,
            None => DEFAULT_PRECISION,
        };
        Ok(Self::new(name, precision))
    }

    /// Render one envelope
    pub fn render(&self, envelope: &RecordEnvelope) -> String {
        let mut block = String::new();
        let ts = envelope
            .processing_timestamp_utc
            .format("%Y-%m-%d %H:%M:%S%.3f");
        let _ = writeln!(block, "--- [{} @ {ts}] ---", self.name);
        for field in envelope.decoded_payload.iter() {
            let value = match &field.value {
                FieldValue::Float(v) => format!("{v:.prec$}", prec = self.precision),
                FieldValue::Signed(v) => v.to_string(),
                FieldValue::Unsigned(v) => v.to_string(),
                FieldValue::Invalid(e) => format!("<{e}>"),
            };
            let _ = match field.unit.as_deref().filter(|_| field.value.is_valid()) {
                Some(unit) => writeln!(block, "  {}: {value} {unit}", field.name),
                None => writeln!(block, "  {}: {value}", field.name),
            };
        }
        block.push_str("--- end of frame ---\n");
        block
    }
}

impl OutputHandler for ConsoleHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Blocking
    }

    #[instrument(name = "console_handler_setup", skip(self), fields(handler = %self.name))]
    async fn setup(&mut self) -> Result<(), ContractError> {
        debug!(handler = %self.name, precision = self.precision, "console handler ready");
        Ok(())
    }

    async fn handle(&mut self, envelope: &RecordEnvelope) -> Result<(), ContractError> {
        let block = self.render(envelope);
        let written = match self.out.write_all(block.as_bytes()).await {
            Ok(()) => self.out.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| ContractError::handler_delivery(&self.name, e.to_string()))
    }

    #[instrument(name = "console_handler_teardown", skip(self), fields(handler = %self.name))]
    async fn teardown(&mut self) -> Result<(), ContractError> {
        self.out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DecodedRecord, FieldError, FieldName};
    use tokio::io::AsyncReadExt;

    fn envelope() -> RecordEnvelope {
        let mut record = DecodedRecord::default();
        record.push(FieldName::new("altitude"), FieldValue::Float(100.0), Some("m".into()));
        record.push(FieldName::new("rocket_id"), FieldValue::Unsigned(1), None);
        record.push(
            FieldName::new("velocity"),
            FieldValue::Invalid(FieldError::InsufficientData {
                expected: 2,
                actual: 1,
            }),
            Some("m/s".into()),
        );
        RecordEnvelope::new(&[0xAB, 0xCD], record, "timestamp_s")
    }

    #[test]
    fn test_render_block() {
        let handler = ConsoleHandler::new("console", 3);
        let block = handler.render(&envelope());
        assert!(block.starts_with("--- [console @ "));
        assert!(block.contains("  altitude: 100.000 m\n"));
        assert!(block.contains("  rocket_id: 1\n"));
        assert!(block.contains("  velocity: <insufficient data"));
        assert!(!block.contains("m/s"));
        assert!(block.ends_with("--- end of frame ---\n"));
    }

    #[tokio::test]
    async fn test_handle_writes_to_output() {
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let mut handler = ConsoleHandler::with_writer("console", 2, Box::new(writer));
        handler.setup().await.unwrap();
        handler.handle(&envelope()).await.unwrap();
        handler.handle(&envelope()).await.unwrap();
        handler.teardown().await.unwrap();
        drop(handler);

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        assert_eq!(written.matches("altitude: 100.00 m").count(), 2);
    }

    #[tokio::test]
    async fn test_closed_output_is_a_delivery_error() {
        let (writer, reader) = tokio::io::duplex(16);
        drop(reader);
        let mut handler = ConsoleHandler::with_writer("console", 2, Box::new(writer));
        let err = handler.handle(&envelope()).await.unwrap_err();
        assert!(matches!(err, ContractError::HandlerDelivery { .. }));
    }

    #[test]
    fn test_precision_param() {
        let params = HashMap::from([("precision".to_string(), "4".to_string())]);
        assert_eq!(ConsoleHandler::from_params("c", &params).unwrap().precision, 4);
        let bad = HashMap::from([("precision".to_string(), "lots".to_string())]);
        assert!(ConsoleHandler::from_params("c", &bad).is_err());
    }
}
