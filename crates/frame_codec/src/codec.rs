//! Schema-driven frame decode/encode.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{
    BinaryEncoding, ByteOrder, DecodedRecord, FieldDescriptor, FieldError, FieldValue,
    FrameSchema,
};
use tracing::warn;

use crate::FrameError;

/// Raw value read from the wire before scaling
#[derive(Debug, Clone, Copy, PartialEq)]
enum Raw {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

/// Stateless codec bound to one schema.
///
/// Cloning shares the schema; decode and encode may run concurrently.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    schema: Arc<FrameSchema>,
}

impl FrameCodec {
    pub fn new(schema: Arc<FrameSchema>) -> Self {
        if schema.sync_field().is_none() {
            warn!(
                total_length = schema.total_length,
                "schema has no sync field, frames are decoded without sync check"
            );
        }
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<FrameSchema> {
        &self.schema
    }

    pub fn frame_len(&self) -> usize {
        self.schema.total_length
    }

    /// Decode one frame.
    ///
    /// Bytes past `total_length` are ignored. A field that cannot be read is
    /// recorded as `FieldValue::Invalid` and decoding continues.
    pub fn decode(&self, raw: &[u8]) -> Result<DecodedRecord, FrameError> {
        let schema = &*self.schema;
        if raw.len() < schema.total_length {
            return Err(FrameError::FrameTooShort {
                expected: schema.total_length,
                actual: raw.len(),
            });
        }

        if let Some(sync) = schema.sync_field() {
            let bytes = field_slice(raw, sync).map_err(|e| {
                FrameError::Schema(format!("sync field '{}': {e}", sync.name))
            })?;
            let actual = read_bits(bytes, schema.byte_order);
            let expected = u64::from(schema.sync_word);
            if actual != expected {
                return Err(FrameError::SyncMismatch { expected, actual });
            }
        }

        let mut record = DecodedRecord::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = match field_slice(raw, field) {
                Ok(bytes) => to_value(field, read_raw(bytes, field.binary_encoding, schema.byte_order)),
                Err(err) => FieldValue::Invalid(err),
            };
            record.push(field.name.clone(), value, field.unit().map(str::to_owned));
        }
        Ok(record)
    }

    /// Encode a record back into a frame.
    ///
    /// Fields are packed contiguously in ascending offset order. Engineering
    /// values are divided by the scale factor and rounded; a value that does
    /// not fit the declared width is rejected instead of truncated.
    pub fn encode(&self, record: &DecodedRecord) -> Result<Bytes, FrameError> {
        let schema = &*self.schema;
        if record.len() != schema.fields.len() {
            return Err(FrameError::FieldCountMismatch {
                expected: schema.fields.len(),
                actual: record.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(schema.total_length);
        for field in schema.fields_by_offset() {
            if field.offset != buf.len() {
                let kind = if field.offset > buf.len() { "gap" } else { "overlap" };
                return Err(FrameError::encoding(
                    &field.name,
                    format!("{kind} before offset {} (packed {} bytes)", field.offset, buf.len()),
                ));
            }
            if field.length != field.binary_encoding.width() {
                return Err(FrameError::encoding(
                    &field.name,
                    format!("length {} does not match {}", field.length, field.binary_encoding),
                ));
            }

            let value = record
                .get(&field.name)
                .ok_or_else(|| FrameError::encoding(&field.name, "missing from record"))?;
            let raw = to_raw(field, value)?;
            write_raw(&mut buf, raw, field.binary_encoding, schema.byte_order);
        }

        if buf.len() != schema.total_length {
            return Err(FrameError::FrameLengthMismatch {
                expected: schema.total_length,
                actual: buf.len(),
            });
        }
        Ok(buf.freeze())
    }
}

fn field_slice<'a>(raw: &'a [u8], field: &FieldDescriptor) -> Result<&'a [u8], FieldError> {
    let end = match field.end() {
        Some(end) if end <= raw.len() => end,
        _ => {
            return Err(FieldError::InsufficientData {
                expected: field.length,
                actual: raw.len().saturating_sub(field.offset),
            })
        }
    };
    if field.length != field.binary_encoding.width() {
        return Err(FieldError::WidthMismatch {
            encoding: field.binary_encoding.as_str(),
            length: field.length,
        });
    }
    Ok(&raw[field.offset..end])
}

/// Unsigned bit pattern of a 1/2/4/8 byte slice
fn read_bits(mut bytes: &[u8], order: ByteOrder) -> u64 {
    match (bytes.len(), order) {
        (1, _) => u64::from(bytes.get_u8()),
        (2, ByteOrder::Big) => u64::from(bytes.get_u16()),
        (2, ByteOrder::Little) => u64::from(bytes.get_u16_le()),
        (4, ByteOrder::Big) => u64::from(bytes.get_u32()),
        (4, ByteOrder::Little) => u64::from(bytes.get_u32_le()),
        (8, ByteOrder::Big) => bytes.get_u64(),
        (8, ByteOrder::Little) => bytes.get_u64_le(),
        _ => 0,
    }
}

// Caller guarantees `bytes.len() == encoding.width()`.
fn read_raw(mut bytes: &[u8], encoding: BinaryEncoding, order: ByteOrder) -> Raw {
    use BinaryEncoding::*;
    let big = order == ByteOrder::Big;
    match encoding {
        Int8 => Raw::Signed(i64::from(bytes.get_i8())),
        UInt8 => Raw::Unsigned(u64::from(bytes.get_u8())),
        Int16 if big => Raw::Signed(i64::from(bytes.get_i16())),
        Int16 => Raw::Signed(i64::from(bytes.get_i16_le())),
        UInt16 if big => Raw::Unsigned(u64::from(bytes.get_u16())),
        UInt16 => Raw::Unsigned(u64::from(bytes.get_u16_le())),
        Int32 if big => Raw::Signed(i64::from(bytes.get_i32())),
        Int32 => Raw::Signed(i64::from(bytes.get_i32_le())),
        UInt32 if big => Raw::Unsigned(u64::from(bytes.get_u32())),
        UInt32 => Raw::Unsigned(u64::from(bytes.get_u32_le())),
        Int64 if big => Raw::Signed(bytes.get_i64()),
        Int64 => Raw::Signed(bytes.get_i64_le()),
        UInt64 if big => Raw::Unsigned(bytes.get_u64()),
        UInt64 => Raw::Unsigned(bytes.get_u64_le()),
        Float32 if big => Raw::Float(f64::from(bytes.get_f32())),
        Float32 => Raw::Float(f64::from(bytes.get_f32_le())),
        Float64 if big => Raw::Float(bytes.get_f64()),
        Float64 => Raw::Float(bytes.get_f64_le()),
    }
}

fn to_value(field: &FieldDescriptor, raw: Raw) -> FieldValue {
    if field.is_raw() {
        return match raw {
            Raw::Signed(v) => FieldValue::Signed(v),
            Raw::Unsigned(v) => FieldValue::Unsigned(v),
            Raw::Float(v) => FieldValue::Float(v),
        };
    }
    let v = match raw {
        Raw::Signed(v) => v as f64,
        Raw::Unsigned(v) => v as f64,
        Raw::Float(v) => v,
    };
    FieldValue::Float(v * field.scale_factor)
}

fn to_raw(field: &FieldDescriptor, value: &FieldValue) -> Result<Raw, FrameError> {
    let encoding = field.binary_encoding;

    // Exact integers on unscaled fields skip the float path.
    let exact = match (value, field.is_raw() || field.scale_factor == 1.0) {
        (FieldValue::Signed(v), true) => Some(i128::from(*v)),
        (FieldValue::Unsigned(v), true) => Some(i128::from(*v)),
        _ => None,
    };

    let engineered = match value {
        FieldValue::Invalid(err) => {
            return Err(FrameError::encoding(&field.name, format!("carries error marker: {err}")))
        }
        other => other.as_f64().unwrap_or(f64::NAN),
    };
    if !engineered.is_finite() {
        return Err(FrameError::encoding(&field.name, "value is not finite"));
    }
    let scaled = if field.is_raw() {
        engineered
    } else {
        engineered / field.scale_factor
    };

    match encoding.integer_range() {
        Some((min, max)) => {
            let n = match exact {
                Some(n) => n,
                None if scaled.is_finite() => scaled.round() as i128,
                None => return Err(FrameError::encoding(&field.name, "scaled value is not finite")),
            };
            if n < min || n > max {
                return Err(FrameError::encoding(
                    &field.name,
                    format!("{n} out of range for {encoding} [{min}, {max}]"),
                ));
            }
            if encoding.is_signed() {
                Ok(Raw::Signed(n as i64))
            } else {
                Ok(Raw::Unsigned(n as u64))
            }
        }
        None => {
            if encoding == BinaryEncoding::Float32 && !(scaled as f32).is_finite() {
                return Err(FrameError::encoding(&field.name, "value overflows float32"));
            }
            Ok(Raw::Float(scaled))
        }
    }
}

// Range was checked by `to_raw`; the casts below cannot truncate.
fn write_raw(buf: &mut BytesMut, raw: Raw, encoding: BinaryEncoding, order: ByteOrder) {
    use BinaryEncoding::*;
    let big = order == ByteOrder::Big;
    let (int, uint, float) = match raw {
        Raw::Signed(v) => (v, v as u64, v as f64),
        Raw::Unsigned(v) => (v as i64, v, v as f64),
        Raw::Float(v) => (v as i64, v as u64, v),
    };
    match encoding {
        Int8 => buf.put_i8(int as i8),
        UInt8 => buf.put_u8(uint as u8),
        Int16 if big => buf.put_i16(int as i16),
        Int16 => buf.put_i16_le(int as i16),
        UInt16 if big => buf.put_u16(uint as u16),
        UInt16 => buf.put_u16_le(uint as u16),
        Int32 if big => buf.put_i32(int as i32),
        Int32 => buf.put_i32_le(int as i32),
        UInt32 if big => buf.put_u32(uint as u32),
        UInt32 => buf.put_u32_le(uint as u32),
        Int64 if big => buf.put_i64(int),
        Int64 => buf.put_i64_le(int),
        UInt64 if big => buf.put_u64(uint),
        UInt64 => buf.put_u64_le(uint),
        Float32 if big => buf.put_f32(float as f32),
        Float32 => buf.put_f32_le(float as f32),
        Float64 if big => buf.put_f64(float),
        Float64 => buf.put_f64_le(float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::FieldName;

    fn field(name: &str, offset: usize, encoding: BinaryEncoding, scale: f64) -> FieldDescriptor {
        FieldDescriptor {
            name: FieldName::new(name),
            offset,
            length: encoding.width(),
            binary_encoding: encoding,
            scale_factor: scale,
            unit: None,
            is_sync_word: false,
            is_checksum: false,
        }
    }

    /// 20-byte rocket telemetry layout
    fn rocket_schema() -> FrameSchema {
        use BinaryEncoding::*;
        let mut sync = field("sync_word", 0, UInt16, 1.0);
        sync.is_sync_word = true;
        let mut altitude = field("altitude", 2, UInt32, 0.1);
        altitude.unit = Some("m".into());
        let mut checksum = field("checksum", 19, UInt8, 1.0);
        checksum.is_checksum = true;
        FrameSchema {
            sync_word: 0xABCD,
            byte_order: ByteOrder::Big,
            total_length: 20,
            fields: vec![
                sync,
                altitude,
                field("velocity", 6, Int16, 0.1),
                field("engine_pressure", 8, UInt16, 0.5),
                field("rocket_id", 10, UInt8, 1.0),
                field("status_byte", 11, UInt8, 1.0),
                field("timestamp_s", 12, UInt32, 1.0),
                field("temperature", 16, Int16, 0.25),
                field("reserved", 18, UInt8, 1.0),
                checksum,
            ],
        }
    }

    fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(rocket_schema()))
    }

    fn sample_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 20];
        frame[..8].copy_from_slice(&[0xAB, 0xCD, 0x00, 0x00, 0x03, 0xE8, 0xFF, 0x9C]);
        frame[19] = 0xEE;
        frame
    }

    #[test]
    fn test_decode_scales_and_keeps_raw_fields() {
        let record = codec().decode(&sample_frame()).unwrap();

        assert_eq!(record.get("sync_word"), Some(&FieldValue::Unsigned(0xABCD)));
        assert_eq!(record.get("altitude"), Some(&FieldValue::Float(100.0)));
        assert_eq!(record.get("checksum"), Some(&FieldValue::Unsigned(0xEE)));
        let velocity = record.get("velocity").and_then(FieldValue::as_f64).unwrap();
        assert!((velocity - -10.0).abs() < 1e-9);
        assert_eq!(record.entry("altitude").unwrap().unit.as_deref(), Some("m"));
        assert_eq!(record.len(), 10);
    }

    #[test]
    fn test_decode_rejects_wrong_sync() {
        let mut frame = sample_frame();
        frame[0] = 0x00;
        frame[1] = 0x00;
        let err = codec().decode(&frame).unwrap_err();
        assert_eq!(
            err,
            FrameError::SyncMismatch {
                expected: 0xABCD,
                actual: 0x0000
            }
        );
    }

    #[test]
    fn test_decode_short_input() {
        let codec = codec();
        for len in [0, 1, 2, 19] {
            let err = codec.decode(&sample_frame()[..len]).unwrap_err();
            assert_eq!(
                err,
                FrameError::FrameTooShort {
                    expected: 20,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut frame = sample_frame();
        frame.extend_from_slice(&[0x11, 0x22]);
        let record = codec().decode(&frame).unwrap();
        assert_eq!(record.get("altitude"), Some(&FieldValue::Float(100.0)));
    }

    #[test]
    fn test_little_endian_layout() {
        let mut schema = rocket_schema();
        schema.byte_order = ByteOrder::Little;
        let codec = FrameCodec::new(Arc::new(schema));
        let mut frame = vec![0u8; 20];
        frame[..6].copy_from_slice(&[0xCD, 0xAB, 0xE8, 0x03, 0x00, 0x00]);
        let record = codec.decode(&frame).unwrap();
        assert_eq!(record.get("altitude"), Some(&FieldValue::Float(100.0)));
    }

    #[test]
    fn test_field_failure_is_isolated() {
        let mut schema = rocket_schema();
        // Declared width disagrees with the encoding.
        schema.fields[8].length = 2;
        schema.fields[8].binary_encoding = BinaryEncoding::UInt32;
        let record = FrameCodec::new(Arc::new(schema)).decode(&sample_frame()).unwrap();

        assert!(matches!(
            record.get("reserved"),
            Some(FieldValue::Invalid(FieldError::WidthMismatch { .. }))
        ));
        assert_eq!(record.get("altitude"), Some(&FieldValue::Float(100.0)));
        assert_eq!(record.invalid_count(), 1);
    }

    #[test]
    fn test_field_past_end_reports_insufficient_data() {
        let mut schema = rocket_schema();
        schema.total_length = 18;
        schema.fields.truncate(8);
        schema.fields.push(field("tail", 17, BinaryEncoding::UInt16, 1.0));
        let record = FrameCodec::new(Arc::new(schema)).decode(&sample_frame()[..18]).unwrap();
        assert_eq!(
            record.get("tail"),
            Some(&FieldValue::Invalid(FieldError::InsufficientData {
                expected: 2,
                actual: 1
            }))
        );
    }

    #[test]
    fn test_overflowing_offset_is_marked_invalid() {
        let mut schema = rocket_schema();
        schema.fields[8].offset = usize::MAX;
        let record = FrameCodec::new(Arc::new(schema)).decode(&sample_frame()).unwrap();

        assert_eq!(
            record.get("reserved"),
            Some(&FieldValue::Invalid(FieldError::InsufficientData {
                expected: 1,
                actual: 0
            }))
        );
        assert_eq!(record.invalid_count(), 1);
    }

    #[test]
    fn test_decode_without_sync_field() {
        let mut schema = rocket_schema();
        schema.fields[0].is_sync_word = false;
        let codec = FrameCodec::new(Arc::new(schema));
        let record = codec.decode(&[0u8; 20]).unwrap();
        // No longer raw: scaled like any other field.
        assert_eq!(record.get("sync_word"), Some(&FieldValue::Float(0.0)));
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let record: DecodedRecord = [
            ("sync_word", FieldValue::Unsigned(0xABCD)),
            ("altitude", FieldValue::Float(1234.5)),
            ("velocity", FieldValue::Float(-12.5)),
            ("engine_pressure", FieldValue::Float(750.5)),
            ("rocket_id", FieldValue::Float(1.0)),
            ("status_byte", FieldValue::Float(5.0)),
            ("timestamp_s", FieldValue::Float(1_700_000_000.0)),
            ("temperature", FieldValue::Float(-40.25)),
            ("reserved", FieldValue::Float(0.0)),
            ("checksum", FieldValue::Unsigned(0xEE)),
        ]
        .into_iter()
        .map(|(name, value)| (FieldName::new(name), value))
        .collect();

        let frame = codec.encode(&record).unwrap();
        assert_eq!(frame.len(), 20);
        assert_eq!(&frame[..2], &[0xAB, 0xCD]);

        let decoded = codec.decode(&frame).unwrap();
        for entry in record.iter() {
            let got = decoded.get(&entry.name).and_then(FieldValue::as_f64).unwrap();
            let want = entry.value.as_f64().unwrap();
            assert!((got - want).abs() < 1e-6, "{}: {got} != {want}", entry.name);
        }
        assert_eq!(codec.encode(&decoded).unwrap(), frame);
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let codec = codec();
        let mut record = codec.decode(&sample_frame()).unwrap();
        let overflow: DecodedRecord = record
            .iter()
            .map(|f| {
                let value = if f.name == "rocket_id" {
                    FieldValue::Float(256.0)
                } else {
                    f.value.clone()
                };
                (f.name.clone(), value)
            })
            .collect();
        let err = codec.encode(&overflow).unwrap_err();
        assert!(matches!(err, FrameError::EncodingError { ref field, .. } if field == "rocket_id"));

        record = record.with("extra", FieldValue::Unsigned(1));
        assert_eq!(
            codec.encode(&record).unwrap_err(),
            FrameError::FieldCountMismatch {
                expected: 10,
                actual: 11
            }
        );
    }

    #[test]
    fn test_encode_rejects_gap_and_invalid() {
        let mut schema = rocket_schema();
        schema.fields.remove(8);
        schema.total_length = 20;
        let codec = FrameCodec::new(Arc::new(schema));
        let record: DecodedRecord = codec
            .schema()
            .fields
            .iter()
            .map(|f| (f.name.clone(), FieldValue::Unsigned(0)))
            .collect();
        let err = codec.encode(&record).unwrap_err();
        assert!(matches!(err, FrameError::EncodingError { ref field, ref reason } if field == "checksum" && reason.starts_with("gap")));

        let codec = self::codec();
        let mut record = codec.decode(&sample_frame()).unwrap();
        record = record
            .iter()
            .map(|f| {
                let value = if f.name == "velocity" {
                    FieldValue::Invalid(FieldError::InsufficientData {
                        expected: 2,
                        actual: 0,
                    })
                } else {
                    f.value.clone()
                };
                (f.name.clone(), value)
            })
            .collect();
        assert!(codec.encode(&record).is_err());
    }

    #[test]
    fn test_encode_length_mismatch_is_loud() {
        let mut schema = rocket_schema();
        schema.total_length = 24;
        let codec = FrameCodec::new(Arc::new(schema));
        let record = self::codec().decode(&sample_frame()).unwrap();
        assert_eq!(
            codec.encode(&record).unwrap_err(),
            FrameError::FrameLengthMismatch {
                expected: 24,
                actual: 20
            }
        );
    }
}
