//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 模拟帧编码失败
    #[error("failed to encode simulated frame: {0}")]
    Encode(#[from] frame_codec::FrameError),

    /// 回放文件行解析失败
    #[error("replay line {line}: {message}")]
    ReplayParse {
        /// 行号 (从 1 开始)
        line: usize,
        /// 错误消息
        message: String,
    },

    /// 读取回放文件失败
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
