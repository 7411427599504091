//! TelemetryBlueprint - Config Loader 输出
//!
//! 描述完整的中继配置：帧 schema、管线参数、输出 handler 列表。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::FrameSchema;

/// 完整的中继配置蓝图
///
/// schema 的键 (`frame_sync_word`, `parameters` ...) 位于顶层，与旧的 schema 文件兼容。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryBlueprint {
    /// 帧布局
    #[serde(flatten)]
    pub schema: FrameSchema,

    /// 管线参数
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// 输出 handler 列表，为空时由调用方决定默认值
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// 管线参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// 成功解码多少帧后停止
    pub max_frames: u64,

    /// 帧间节拍 (毫秒)，0 表示不等待
    pub frame_interval_ms: u64,

    /// 阻塞型 handler 入队等待上限 (毫秒)
    pub handler_timeout_ms: u64,

    /// 广播循环排空宽限期 (毫秒)
    pub drain_grace_ms: u64,

    /// 监听器关闭宽限期 (毫秒)
    pub listener_grace_ms: u64,

    /// 复制到 `source_timestamp_s` 的字段名
    pub source_timestamp_field: String,

    /// 源失败重试
    pub retry: RetrySettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_frames: 10_000,
            frame_interval_ms: 200,
            handler_timeout_ms: 1_000,
            drain_grace_ms: 5_000,
            listener_grace_ms: 2_000,
            source_timestamp_field: "timestamp_s".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn listener_grace(&self) -> Duration {
        Duration::from_millis(self.listener_grace_ms)
    }
}

/// 源失败重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// 连续失败超过该次数后结束
    pub max_consecutive_failures: u32,

    /// 退避方式
    pub backoff: BackoffKind,

    /// 首次 (或固定) 退避时间 (毫秒)
    pub backoff_ms: u64,

    /// 指数退避上限 (毫秒)
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            backoff: BackoffKind::Fixed,
            backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

/// 退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    None,
    #[default]
    Fixed,
    Exponential,
}

/// Handler 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler 名称
    pub name: String,

    /// Handler 类型
    pub handler_type: HandlerType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

impl HandlerConfig {
    pub fn new(name: impl Into<String>, handler_type: HandlerType) -> Self {
        Self {
            name: name.into(),
            handler_type,
            queue_capacity: default_queue_capacity(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Handler 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    /// 控制台实时查看
    Console,
    /// JSONL 文件日志
    File,
    /// WebSocket 广播
    Broadcast,
}

impl TelemetryBlueprint {
    /// 未配置 handler 时使用的默认组合：控制台 + 文件日志
    pub fn default_handlers() -> Vec<HandlerConfig> {
        vec![
            HandlerConfig::new("console", HandlerType::Console),
            HandlerConfig::new("file", HandlerType::File),
        ]
    }

    /// 配置中的 handler，为空时返回默认组合
    pub fn effective_handlers(&self) -> Vec<HandlerConfig> {
        if self.handlers.is_empty() {
            Self::default_handlers()
        } else {
            self.handlers.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "frame_sync_word": "0xABCD",
        "byte_order": "big",
        "frame_total_length": 2,
        "parameters": [
            {"name": "sync_word", "offset": 0, "length": 2, "binary_encoding": "uint16", "is_sync_word": true}
        ]
    }"#;

    #[test]
    fn pipeline_defaults_when_absent() {
        let blueprint: TelemetryBlueprint = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(blueprint.pipeline, PipelineSettings::default());
        assert_eq!(blueprint.pipeline.max_frames, 10_000);
        assert_eq!(blueprint.pipeline.retry.max_consecutive_failures, 5);
        assert_eq!(blueprint.pipeline.drain_grace(), Duration::from_secs(5));
        assert_eq!(blueprint.schema.total_length, 2);
    }

    #[test]
    fn effective_handlers_fall_back_to_console_and_file() {
        let blueprint: TelemetryBlueprint = serde_json::from_str(MINIMAL).unwrap();
        let handlers = blueprint.effective_handlers();
        let types: Vec<HandlerType> = handlers.iter().map(|h| h.handler_type).collect();
        assert_eq!(types, [HandlerType::Console, HandlerType::File]);
        assert!(handlers.iter().all(|h| h.queue_capacity == 100));
    }

    #[test]
    fn partial_retry_override() {
        let json = MINIMAL.trim_end().trim_end_matches('}').to_string()
            + r#", "pipeline": {"max_frames": 3, "retry": {"backoff": "exponential"}},
                 "handlers": [{"name": "ws", "handler_type": "broadcast", "params": {"addr": "0.0.0.0:9000"}}]}"#;
        let blueprint: TelemetryBlueprint = serde_json::from_str(&json).unwrap();
        assert_eq!(blueprint.pipeline.max_frames, 3);
        assert_eq!(blueprint.pipeline.frame_interval_ms, 200);
        assert_eq!(blueprint.pipeline.retry.backoff, BackoffKind::Exponential);
        assert_eq!(blueprint.pipeline.retry.backoff_ms, 500);
        assert_eq!(blueprint.handlers[0].handler_type, HandlerType::Broadcast);
        assert_eq!(blueprint.handlers[0].params["addr"], "0.0.0.0:9000");
    }
}
