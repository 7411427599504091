//! 遥测中继指标收集模块
//!
//! `record_*` 函数写入 `metrics` facade (安装了 Prometheus recorder 时导出)，
//! `TelemetryAggregator` 在内存中汇总一次运行的统计，用于结束时输出摘要。

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// 记录一帧成功解码
pub fn record_frame_decoded(decode_latency_us: f64) {
    counter!("telemetry_frames_decoded_total").increment(1);
    histogram!("telemetry_decode_latency_us").record(decode_latency_us);
}

/// 记录一帧被拒绝 (过短、同步字不匹配 ...)
pub fn record_frame_rejected(reason: &'static str) {
    counter!("telemetry_frames_rejected_total", "reason" => reason).increment(1);
}

/// 记录一次源拉取失败
pub fn record_source_failure() {
    counter!("telemetry_source_failures_total").increment(1);
}

/// Handler 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Dropped,
    TimedOut,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
            Self::TimedOut => "timed_out",
        }
    }
}

/// 记录一次 handler 投递
pub fn record_handler_delivery(handler: &str, status: DeliveryStatus) {
    counter!(
        "telemetry_handler_deliveries_total",
        "handler" => handler.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// 记录 handler 队列深度
pub fn record_handler_queue_len(handler: &str, len: usize) {
    gauge!("telemetry_handler_queue_len", "handler" => handler.to_string()).set(len as f64);
}

/// 记录广播队列满时丢弃的记录
pub fn record_broadcast_dropped() {
    counter!("telemetry_broadcast_dropped_total").increment(1);
}

/// 当前连接的实时消费者数量
pub fn set_broadcast_consumers(count: usize) {
    gauge!("telemetry_broadcast_consumers").set(count as f64);
}

/// 运行统计聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct TelemetryAggregator {
    /// 成功解码帧数
    pub frames_decoded: u64,

    /// 按原因统计的拒绝帧数
    pub rejected: BTreeMap<&'static str, u64>,

    /// 源拉取失败次数
    pub source_failures: u64,

    /// 含错误标记字段的帧数
    pub frames_with_invalid_fields: u64,

    /// 解码耗时 (微秒)
    pub decode_latency_us: RunningStats,
}

impl TelemetryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功解码，并写入 metrics facade
    pub fn on_decoded(&mut self, decode_latency_us: f64, invalid_fields: usize) {
        self.frames_decoded += 1;
        if invalid_fields > 0 {
            self.frames_with_invalid_fields += 1;
        }
        self.decode_latency_us.push(decode_latency_us);
        record_frame_decoded(decode_latency_us);
    }

    /// 记录被拒绝的帧
    pub fn on_rejected(&mut self, reason: &'static str) {
        *self.rejected.entry(reason).or_insert(0) += 1;
        record_frame_rejected(reason);
    }

    /// 记录源失败
    pub fn on_source_failure(&mut self) {
        self.source_failures += 1;
        record_source_failure();
    }

    /// 拒绝帧总数
    pub fn frames_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> TelemetrySummary {
        let rejected = self.frames_rejected();
        let seen = self.frames_decoded + rejected;
        TelemetrySummary {
            frames_decoded: self.frames_decoded,
            frames_rejected: rejected,
            rejected_by_reason: self.rejected.clone(),
            source_failures: self.source_failures,
            frames_with_invalid_fields: self.frames_with_invalid_fields,
            reject_rate: if seen > 0 {
                rejected as f64 / seen as f64 * 100.0
            } else {
                0.0
            },
            decode_latency_us: StatsSummary::from(&self.decode_latency_us),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct TelemetrySummary {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub rejected_by_reason: BTreeMap<&'static str, u64>,
    pub source_failures: u64,
    pub frames_with_invalid_fields: u64,
    pub reject_rate: f64,
    pub decode_latency_us: StatsSummary,
}

impl std::fmt::Display for TelemetrySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Telemetry Summary ===")?;
        writeln!(f, "Frames decoded: {}", self.frames_decoded)?;
        writeln!(
            f,
            "Frames rejected: {} ({:.2}%)",
            self.frames_rejected, self.reject_rate
        )?;
        for (reason, count) in &self.rejected_by_reason {
            writeln!(f, "  {}: {}", reason, count)?;
        }
        writeln!(f, "Source failures: {}", self.source_failures)?;
        writeln!(
            f,
            "Frames with invalid fields: {}",
            self.frames_with_invalid_fields
        )?;
        writeln!(f, "Decode latency (us): {}", self.decode_latency_us)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
