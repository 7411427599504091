//! # Frame Codec
//!
//! Schema 驱动的定长二进制帧编解码。
//!
//! 负责：
//! - 长度与同步字校验
//! - 按字段偏移/编码/字节序解码，应用缩放系数
//! - 单字段失败时写入错误标记并继续
//! - 反向编码，拒绝无法精确放入声明宽度的值
//!
//! ## 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use frame_codec::FrameCodec;
//!
//! let codec = FrameCodec::new(Arc::new(schema));
//! let record = codec.decode(&raw)?;
//! let bytes = codec.encode(&record)?;
//! ```

mod codec;
mod error;

pub use codec::FrameCodec;
pub use error::FrameError;
