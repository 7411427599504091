//! 回放帧源
//!
//! 回放预先录制的帧：十六进制行文件，或文件日志 handler 写出的 JSONL 记录
//! (取 `raw_frame_hex`)。也可以直接用脚本化的帧序列构造，`None` 表示一次拉取失败。

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use contracts::FrameSupplier;
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};
use crate::metrics::SourceMetrics;

/// 回放帧源，耗尽后每次拉取都返回 `None`
pub struct ReplayFrameSource {
    frames: VecDeque<Option<Bytes>>,
    metrics: Arc<SourceMetrics>,
}

impl ReplayFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Bytes>) -> Self {
        Self::scripted(frames.into_iter().map(Some))
    }

    /// 脚本化序列，`None` 项模拟一次源失败
    pub fn scripted(frames: impl IntoIterator<Item = Option<Bytes>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    /// 从文件加载
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let source = Self::parse(&content)?;
        debug!(path = %path.display(), frames = source.remaining(), "replay file loaded");
        Ok(source)
    }

    /// 解析回放文本：空行与 `#` 注释行被忽略，`{` 开头的行按 JSON 记录解析
    pub fn parse(content: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            frames.push(parse_line(idx + 1, line)?);
        }
        Ok(Self::new(frames))
    }

    /// 尚未回放的条目数
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<Bytes> {
    let hex_text = if line.starts_with('{') {
        let record: serde_json::Value =
            serde_json::from_str(line).map_err(|e| IngestionError::ReplayParse {
                line: line_no,
                message: e.to_string(),
            })?;
        record
            .get("raw_frame_hex")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or(IngestionError::ReplayParse {
                line: line_no,
                message: "record has no raw_frame_hex".to_string(),
            })?
    } else {
        line.split_whitespace().collect::<String>()
    };
    hex::decode(&hex_text)
        .map(Bytes::from)
        .map_err(|e| IngestionError::ReplayParse {
            line: line_no,
            message: format!("invalid hex: {e}"),
        })
}

impl FrameSupplier for ReplayFrameSource {
    async fn next_frame(&mut self) -> Option<Bytes> {
        match self.frames.pop_front().flatten() {
            Some(frame) => {
                self.metrics.record_supplied();
                trace!(len = frame.len(), "replayed frame");
                Some(frame)
            }
            None => {
                self.metrics.record_failure();
                None
            }
        }
    }
}
