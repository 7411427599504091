//! RecordEnvelope - 分发给 handler 的单帧记录
//!
//! 每帧只构造一次，以 `Arc<RecordEnvelope>` 共享给所有 handler，进入分发管线后不再修改。

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::{DecodedRecord, FieldValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordEnvelope {
    /// 中继处理该帧的时间 (UTC)
    #[serde(serialize_with = "rfc3339")]
    pub processing_timestamp_utc: DateTime<Utc>,

    /// 帧内携带的源时间戳，没有该字段时为 `null`
    pub source_timestamp_s: Option<FieldValue>,

    /// 原始帧的大写十六进制
    pub raw_frame_hex: String,

    pub decoded_payload: DecodedRecord,
}

impl RecordEnvelope {
    /// Wrap a decoded frame. `timestamp_field` names the payload field copied
    /// into `source_timestamp_s`.
    pub fn new(raw: &[u8], decoded_payload: DecodedRecord, timestamp_field: &str) -> Self {
        Self::at(Utc::now(), raw, decoded_payload, timestamp_field)
    }

    pub fn at(
        processing_timestamp_utc: DateTime<Utc>,
        raw: &[u8],
        decoded_payload: DecodedRecord,
        timestamp_field: &str,
    ) -> Self {
        let source_timestamp_s = decoded_payload.get(timestamp_field).cloned();
        Self {
            processing_timestamp_utc,
            source_timestamp_s,
            raw_frame_hex: hex::encode_upper(raw),
            decoded_payload,
        }
    }

    /// Persisted form: one JSON object, no trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn sample_payload() -> DecodedRecord {
        DecodedRecord::default()
            .with("sync_word", FieldValue::Unsigned(0xABCD))
            .with("timestamp_s", FieldValue::Unsigned(1_700_000_000))
    }

    #[test]
    fn copies_source_timestamp_and_hex() {
        let raw = Bytes::from_static(&[0xAB, 0xCD, 0x0f]);
        let env = RecordEnvelope::new(&raw, sample_payload(), "timestamp_s");
        assert_eq!(env.raw_frame_hex, "ABCD0F");
        assert_eq!(env.source_timestamp_s, Some(FieldValue::Unsigned(1_700_000_000)));
    }

    #[test]
    fn missing_timestamp_field_is_null() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let env = RecordEnvelope::at(ts, &[0x01], sample_payload(), "epoch");
        let value: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert!(value["source_timestamp_s"].is_null());
        assert_eq!(value["processing_timestamp_utc"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(value["decoded_payload"]["sync_word"], 43981);
        assert_eq!(value["raw_frame_hex"], "01");
    }
}
