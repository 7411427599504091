//! 通道帧源
//!
//! 由外部任务 (串口/UDP 读取器、测试) 推送帧，管线侧按需拉取。

use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use bytes::Bytes;
use contracts::FrameSupplier;
use tracing::trace;

use crate::metrics::SourceMetrics;

/// 通道帧源
///
/// 超时或通道关闭都视为一次拉取失败。
pub struct ChannelFrameSource {
    rx: Receiver<Bytes>,
    recv_timeout: Option<Duration>,
    metrics: Arc<SourceMetrics>,
}

impl ChannelFrameSource {
    pub fn new(rx: Receiver<Bytes>, recv_timeout: Option<Duration>) -> Self {
        Self {
            rx,
            recv_timeout,
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    /// 创建有界通道，返回发送端与帧源
    pub fn bounded(capacity: usize, recv_timeout: Option<Duration>) -> (Sender<Bytes>, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        (tx, Self::new(rx, recv_timeout))
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }
}

impl FrameSupplier for ChannelFrameSource {
    async fn next_frame(&mut self) -> Option<Bytes> {
        let received = match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx.recv())
                .await
                .ok()
                .and_then(Result::ok),
            None => self.rx.recv().await.ok(),
        };
        match received {
            Some(frame) => {
                self.metrics.record_supplied();
                Some(frame)
            }
            None => {
                self.metrics.record_failure();
                trace!(closed = self.rx.is_closed(), "channel pull produced no frame");
                None
            }
        }
    }
}
