//! FrameSchema - 帧布局描述
//!
//! 一份 schema 描述一个固定长度的二进制帧：同步字、字节序、总长度以及每个字段的
//! 偏移/宽度/编码/缩放系数。加载后不可变，通过 `Arc` 在解码调用之间只读共享。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{ContractError, FieldName};

/// 字段的二进制编码
///
/// 配置文件中既可以写名字 (`"uint16"`)，也可以写旧 schema 使用的单字符打包码
/// (`b B h H i I l L q Q f d`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BinaryEncoding {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl BinaryEncoding {
    /// 编码占用的字节数
    pub const fn width(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(self) -> bool {
        !self.is_float() && !self.is_signed()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// 整数编码可表示的闭区间，浮点编码返回 `None`
    pub fn integer_range(self) -> Option<(i128, i128)> {
        let range = match self {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::UInt8 => (0, u8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::UInt16 => (0, u16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::UInt32 => (0, u32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt64 => (0, u64::MAX as i128),
            Self::Float32 | Self::Float64 => return None,
        };
        Some(range)
    }
}

impl FromStr for BinaryEncoding {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoding = match s.trim() {
            "int8" | "i8" | "b" => Self::Int8,
            "uint8" | "u8" | "B" => Self::UInt8,
            "int16" | "i16" | "h" => Self::Int16,
            "uint16" | "u16" | "H" => Self::UInt16,
            "int32" | "i32" | "i" | "l" => Self::Int32,
            "uint32" | "u32" | "I" | "L" => Self::UInt32,
            "int64" | "i64" | "q" => Self::Int64,
            "uint64" | "u64" | "Q" => Self::UInt64,
            "float32" | "f32" | "f" => Self::Float32,
            "float64" | "f64" | "d" => Self::Float64,
            other => {
                return Err(ContractError::config_validation(
                    "binary_encoding",
                    format!("unknown binary encoding '{other}'"),
                ))
            }
        };
        Ok(encoding)
    }
}

impl TryFrom<String> for BinaryEncoding {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BinaryEncoding> for String {
    fn from(value: BinaryEncoding) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BinaryEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帧内多字节字段的字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl FromStr for ByteOrder {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "big" | ">" | "!" => Ok(Self::Big),
            "little" | "<" => Ok(Self::Little),
            other => Err(ContractError::config_validation(
                "byte_order",
                format!("unknown byte order '{other}', expected big or little"),
            )),
        }
    }
}

impl TryFrom<String> for ByteOrder {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ByteOrder> for String {
    fn from(value: ByteOrder) -> Self {
        match value {
            ByteOrder::Big => "big".into(),
            ByteOrder::Little => "little".into(),
        }
    }
}

/// 单个字段的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// 字段名，在 schema 内唯一
    pub name: FieldName,

    /// 距帧首的字节偏移
    pub offset: usize,

    /// 字节宽度，必须等于编码宽度
    pub length: usize,

    /// 二进制编码
    #[serde(alias = "struct_format")]
    pub binary_encoding: BinaryEncoding,

    /// 缩放系数：工程值 = 原始值 * scale_factor
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// 工程单位 (可选)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// 是否为同步字字段
    #[serde(default, alias = "is_sync")]
    pub is_sync_word: bool,

    /// 是否为校验和字段
    #[serde(default)]
    pub is_checksum: bool,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl FieldDescriptor {
    /// 同步字和校验和按原始整数上报，不做缩放
    pub fn is_raw(&self) -> bool {
        self.is_sync_word || self.is_checksum
    }

    /// 字段结束位置 (不含)，溢出时为 `None`
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }

    /// 空单位按未声明处理
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref().filter(|u| !u.is_empty())
    }
}

/// 完整的帧布局
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSchema {
    /// 期望的同步字
    #[serde(rename = "frame_sync_word", with = "sync_word_repr")]
    pub sync_word: u32,

    /// 字节序
    pub byte_order: ByteOrder,

    /// 帧总长度 (字节)
    #[serde(rename = "frame_total_length")]
    pub total_length: usize,

    /// 字段列表，保持配置中的顺序
    #[serde(rename = "parameters")]
    pub fields: Vec<FieldDescriptor>,
}

impl FrameSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn sync_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_sync_word)
    }

    pub fn checksum_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_checksum)
    }

    /// 按偏移升序排列的字段 (偏移相同时保持配置顺序)
    pub fn fields_by_offset(&self) -> Vec<&FieldDescriptor> {
        let mut ordered: Vec<&FieldDescriptor> = self.fields.iter().collect();
        ordered.sort_by_key(|f| f.offset);
        ordered
    }
}

/// 同步字在配置中可以是十六进制字符串 (`"0xABCD"`) 或整数
mod sync_word_repr {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{value:04X}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        use serde::de::Error;

        let raw = match Repr::deserialize(deserializer)? {
            Repr::Int(v) => v,
            Repr::Text(s) => {
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"));
                let parsed = match digits {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => trimmed.parse::<u64>(),
                };
                parsed.map_err(|e| D::Error::custom(format!("invalid frame_sync_word '{s}': {e}")))?
            }
        };
        u32::try_from(raw)
            .map_err(|_| D::Error::custom(format!("frame_sync_word {raw:#X} exceeds 32 bits")))
    }
}
