//! 模拟帧源
//!
//! 按 schema 生成随机遥测值并编码成帧，用于无真实下行链路时的演示与测试。

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use contracts::{BinaryEncoding, DecodedRecord, FieldDescriptor, FieldValue, FrameSupplier};
use frame_codec::FrameCodec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::metrics::SourceMetrics;

/// 默认数值窗口 (原始整数)，避免生成极端值
const DEFAULT_RAW_SPAN: (i128, i128) = (-1_000, 1_000);

/// 模拟源配置
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// 随机种子，`None` 时取系统熵
    pub seed: Option<u64>,

    /// `next_frame` 返回 `None` 的概率
    pub failure_rate: f64,

    /// 同步字被破坏的概率
    pub corrupt_rate: f64,

    /// 写入当前 unix 时间的字段
    pub timestamp_field: String,

    /// 校验和字段的固定值
    pub checksum_value: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            failure_rate: 0.0,
            corrupt_rate: 0.0,
            timestamp_field: "timestamp_s".to_string(),
            checksum_value: 0xEE,
        }
    }
}

/// 模拟帧源
pub struct SimulatedFrameSource {
    codec: FrameCodec,
    config: SimulationConfig,
    rng: StdRng,
    metrics: Arc<SourceMetrics>,
}

impl SimulatedFrameSource {
    /// 创建模拟源，概率参数被截断到 [0, 1]
    pub fn new(codec: FrameCodec, mut config: SimulationConfig) -> Self {
        config.failure_rate = clamp_probability(config.failure_rate);
        config.corrupt_rate = clamp_probability(config.corrupt_rate);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        debug!(
            frame_len = codec.frame_len(),
            failure_rate = config.failure_rate,
            corrupt_rate = config.corrupt_rate,
            "simulated frame source created"
        );
        Self {
            codec,
            config,
            rng,
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// 按 schema 顺序生成一条记录
    pub fn generate_record(&mut self) -> DecodedRecord {
        let schema = Arc::clone(self.codec.schema());
        let mut record = DecodedRecord::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = if field.is_sync_word {
                FieldValue::Unsigned(u64::from(schema.sync_word))
            } else if field.is_checksum {
                let max = field.binary_encoding.integer_range().map_or(0, |(_, max)| max);
                FieldValue::Unsigned(i128::from(self.config.checksum_value).min(max) as u64)
            } else {
                self.generate_value(field)
            };
            record.push(field.name.clone(), value, None);
        }
        record
    }

    /// 生成并编码一帧
    pub fn generate_frame(&mut self) -> Result<Bytes> {
        let record = self.generate_record();
        let frame = self.codec.encode(&record)?;
        if self.config.corrupt_rate > 0.0 && self.rng.random_bool(self.config.corrupt_rate) {
            let sync_range = self
                .codec
                .schema()
                .sync_field()
                .and_then(|sync| Some(sync.offset..sync.end()?));
            if let Some(range) = sync_range {
                let mut corrupted = BytesMut::from(&frame[..]);
                for byte in &mut corrupted[range] {
                    *byte ^= 0xFF;
                }
                self.metrics.record_corrupted();
                trace!("sync word corrupted");
                return Ok(corrupted.freeze());
            }
        }
        Ok(frame)
    }

    fn generate_value(&mut self, field: &FieldDescriptor) -> FieldValue {
        let encoding = field.binary_encoding;
        let name = field.name.as_str();

        if name == self.config.timestamp_field {
            let now = chrono::Utc::now().timestamp() + self.rng.random_range(0..=5);
            return FieldValue::Float(self.fit_raw(encoding, i128::from(now)) as f64 * field.scale_factor);
        }

        let engineering = match name {
            "rocket_id" => Some((1.0, 1.0)),
            "altitude" => Some((0.0, 80_000.0)),
            "velocity" => Some((0.0, 3_000.0)),
            "engine_pressure" => Some((0.0, 2_000.0)),
            "status_byte" => Some((0.0, 7.0)),
            _ => None,
        };

        if encoding.is_float() {
            let (lo, hi) = engineering.unwrap_or((-1_000.0, 1_000.0));
            let v = if hi > lo { self.rng.random_range(lo..=hi) } else { lo };
            return FieldValue::Float(v);
        }

        let (lo, hi) = match engineering {
            Some((lo, hi)) => {
                let (a, b) = ((lo / field.scale_factor).round(), (hi / field.scale_factor).round());
                (a.min(b) as i128, a.max(b) as i128)
            }
            None => DEFAULT_RAW_SPAN,
        };
        let (lo, hi) = (self.fit_raw(encoding, lo), self.fit_raw(encoding, hi));
        let raw = if hi > lo { self.rng.random_range(lo..=hi) } else { lo };
        FieldValue::Float(raw as f64 * field.scale_factor)
    }

    fn fit_raw(&self, encoding: BinaryEncoding, raw: i128) -> i128 {
        match encoding.integer_range() {
            Some((min, max)) => raw.clamp(min, max),
            None => raw,
        }
    }
}

impl FrameSupplier for SimulatedFrameSource {
    async fn next_frame(&mut self) -> Option<Bytes> {
        if self.config.failure_rate > 0.0 && self.rng.random_bool(self.config.failure_rate) {
            self.metrics.record_failure();
            trace!("simulated pull failure");
            return None;
        }
        match self.generate_frame() {
            Ok(frame) => {
                self.metrics.record_supplied();
                Some(frame)
            }
            Err(e) => {
                self.metrics.record_failure();
                warn!(error = %e, "simulated frame could not be encoded");
                None
            }
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ByteOrder, FieldName, FrameSchema};
    use frame_codec::FrameError;

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

    fn codec() -> FrameCodec {
        use BinaryEncoding::*;
        let mut sync = field("sync_word", 0, UInt16, 1.0);
        sync.is_sync_word = true;
        let mut checksum = field("checksum", 17, UInt8, 1.0);
        checksum.is_checksum = true;
        FrameCodec::new(Arc::new(FrameSchema {
            sync_word: 0xABCD,
            byte_order: ByteOrder::Big,
            total_length: 18,
            fields: vec![
                sync,
                field("altitude", 2, UInt32, 0.1),
                field("velocity", 6, Int16, 0.1),
                field("timestamp_s", 8, UInt32, 1.0),
                field("gyro", 12, Float32, 1.0),
                field("status_byte", 16, UInt8, 1.0),
                checksum,
            ],
        }))
    }

    #[tokio::test]
    async fn test_simulated_frames_decode() {
        let codec = codec();
        let mut source = SimulatedFrameSource::new(
            codec.clone(),
            SimulationConfig {
                seed: Some(7),
                ..Default::default()
            },
        );

        for _ in 0..20 {
            let frame = source.next_frame().await.unwrap();
            assert_eq!(frame.len(), 18);
            let record = codec.decode(&frame).unwrap();
            assert_eq!(record.get("checksum"), Some(&FieldValue::Unsigned(0xEE)));
            let altitude = record.get("altitude").and_then(FieldValue::as_f64).unwrap();
            assert!((0.0..=80_000.0).contains(&altitude), "altitude {altitude}");
            let status = record.get("status_byte").and_then(FieldValue::as_f64).unwrap();
            assert!(status <= 7.0);
            assert!(record.get("timestamp_s").and_then(FieldValue::as_f64).unwrap() > 1.6e9);
        }
        assert_eq!(source.metrics().snapshot().frames_supplied, 20);
    }

    #[tokio::test]
    async fn test_same_seed_same_frames() {
        let config = SimulationConfig {
            seed: Some(42),
            timestamp_field: "none".into(),
            ..Default::default()
        };
        let mut a = SimulatedFrameSource::new(codec(), config.clone());
        let mut b = SimulatedFrameSource::new(codec(), config);
        for _ in 0..5 {
            assert_eq!(a.next_frame().await, b.next_frame().await);
        }
    }

    #[tokio::test]
    async fn test_failure_and_corruption_rates() {
        let codec = codec();
        let mut failing = SimulatedFrameSource::new(
            codec.clone(),
            SimulationConfig {
                seed: Some(1),
                failure_rate: 1.0,
                ..Default::default()
            },
        );
        assert!(failing.next_frame().await.is_none());
        assert_eq!(failing.metrics().snapshot().failures, 1);

        let mut corrupting = SimulatedFrameSource::new(
            codec.clone(),
            SimulationConfig {
                seed: Some(1),
                corrupt_rate: 1.0,
                ..Default::default()
            },
        );
        let frame = corrupting.next_frame().await.unwrap();
        assert!(matches!(
            codec.decode(&frame),
            Err(FrameError::SyncMismatch { expected: 0xABCD, .. })
        ));
        assert_eq!(corrupting.metrics().snapshot().corrupted, 1);
    }
}
