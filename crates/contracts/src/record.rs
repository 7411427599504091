//! DecodedRecord - 单帧解码结果
//!
//! 按 schema 顺序保存 字段名 → 值 的映射，单个字段解码失败时以
//! `FieldValue::Invalid` 作为显式错误标记，不影响其它字段。

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

use crate::FieldName;

/// 单个字段的解码失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// 帧内剩余字节不足以覆盖该字段
    InsufficientData { expected: usize, actual: usize },
    /// 字段宽度与编码宽度不一致
    WidthMismatch { encoding: &'static str, length: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { expected, actual } => {
                write!(f, "insufficient data: need {expected} bytes, got {actual}")
            }
            Self::WidthMismatch { encoding, length } => {
                write!(f, "decode error: {encoding} cannot be read from {length} bytes")
            }
        }
    }
}

/// 解码后的字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Invalid(FieldError),
}

impl FieldValue {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    /// 数值视图，错误标记返回 `None`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Signed(v) => Some(v as f64),
            Self::Unsigned(v) => Some(v as f64),
            Self::Float(v) => Some(v),
            Self::Invalid(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Unsigned(v) => Some(v),
            Self::Signed(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Signed(v) => serializer.serialize_i64(*v),
            Self::Unsigned(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Invalid(err) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", &err.to_string())?;
                map.end()
            }
        }
    }
}

/// 一个已解码字段
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub name: FieldName,
    pub value: FieldValue,
    pub unit: Option<String>,
}

/// 一帧的完整解码结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    fields: Vec<DecodedField>,
}

impl DecodedRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: FieldName, value: FieldValue, unit: Option<String>) {
        self.fields.push(DecodedField { name, value, unit });
    }

    /// Builder-style insert without a unit
    pub fn with(mut self, name: impl Into<FieldName>, value: FieldValue) -> Self {
        self.push(name.into(), value, None);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entry(name).map(|f| &f.value)
    }

    pub fn entry(&self, name: &str) -> Option<&DecodedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecodedField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields carrying the error marker
    pub fn invalid_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.value.is_valid()).count()
    }
}

impl FromIterator<(FieldName, FieldValue)> for DecodedRecord {
    fn from_iter<T: IntoIterator<Item = (FieldName, FieldValue)>>(iter: T) -> Self {
        let mut record = Self::default();
        for (name, value) in iter {
            record.push(name, value, None);
        }
        record
    }
}

// JSON object in schema order, `<name>_unit` after each successfully decoded
// field that declares a unit.
impl Serialize for DecodedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for field in &self.fields {
            map.serialize_entry(field.name.as_str(), &field.value)?;
            if let (true, Some(unit)) = (field.value.is_valid(), field.unit.as_deref()) {
                map.serialize_entry(&field.name.unit_key(), unit)?;
            }
        }
        map.end()
    }
}
