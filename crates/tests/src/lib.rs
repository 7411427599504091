//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - schema 文件 -> 编解码器 -> 分发管线的完整链路
//! - handler 故障隔离与关闭顺序
//! - 文件 / WebSocket 输出的端到端校验

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use contracts::{
        ContractError, DeliveryMode, OutputHandler, PipelineSettings, RecordEnvelope,
        TelemetryBlueprint,
    };
    use frame_codec::FrameCodec;

    /// 6-byte frame: sync word + altitude (0.1 m)
    pub const ALTITUDE_SCHEMA: &str = r#"
frame_sync_word = "0xABCD"
byte_order = "big"
frame_total_length = 6

[[parameters]]
name = "sync_word"
offset = 0
length = 2
binary_encoding = "uint16"
is_sync_word = true

[[parameters]]
name = "altitude"
offset = 2
length = 4
binary_encoding = "uint32"
scale_factor = 0.1
unit = "m"

[pipeline]
max_frames = 0
frame_interval_ms = 0
handler_timeout_ms = 500
drain_grace_ms = 1000
listener_grace_ms = 1000

[pipeline.retry]
max_consecutive_failures = 1
backoff = "none"
"#;

    pub fn blueprint() -> TelemetryBlueprint {
        config_loader::ConfigLoader::load_from_str(
            ALTITUDE_SCHEMA,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap()
    }

    pub fn codec() -> FrameCodec {
        FrameCodec::new(Arc::new(blueprint().schema))
    }

    pub fn settings(max_frames: u64) -> PipelineSettings {
        PipelineSettings {
            max_frames,
            ..blueprint().pipeline
        }
    }

    /// Frame with altitude `raw * 0.1` m
    pub fn frame(sync: u16, raw_altitude: u32) -> Bytes {
        let mut buf = Vec::with_capacity(6);
        buf.extend_from_slice(&sync.to_be_bytes());
        buf.extend_from_slice(&raw_altitude.to_be_bytes());
        Bytes::from(buf)
    }

    #[derive(Debug, Default)]
    pub struct Calls {
        pub setup: AtomicU64,
        pub handled: AtomicU64,
        pub teardown: AtomicU64,
    }

    impl Calls {
        pub fn get(counter: &AtomicU64) -> u64 {
            counter.load(Ordering::SeqCst)
        }
    }

    /// Counts lifecycle calls; optionally fails every delivery
    pub struct CountingHandler {
        pub name: String,
        pub mode: DeliveryMode,
        pub fail: bool,
        pub calls: Arc<Calls>,
    }

    impl CountingHandler {
        pub fn new(name: &str, mode: DeliveryMode) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let handler = Self {
                name: name.to_string(),
                mode,
                fail: false,
                calls: Arc::clone(&calls),
            };
            (handler, calls)
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl OutputHandler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn delivery_mode(&self) -> DeliveryMode {
            self.mode
        }

        async fn setup(&mut self) -> Result<(), ContractError> {
            self.calls.setup.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn handle(&mut self, _envelope: &RecordEnvelope) -> Result<(), ContractError> {
            self.calls.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ContractError::handler_delivery(&self.name, "always fails"));
            }
            Ok(())
        }

        async fn teardown(&mut self) -> Result<(), ContractError> {
            self.calls.teardown.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod codec_tests {
    use contracts::FieldValue;

    use super::support::{codec, frame};

    #[test]
    fn test_altitude_frame_decodes() {
        let record = codec().decode(&frame(0xABCD, 1000)).unwrap();

        assert_eq!(record.get("sync_word"), Some(&FieldValue::Unsigned(0xABCD)));
        let altitude = record.get("altitude").and_then(FieldValue::as_f64).unwrap();
        assert!((altitude - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sync_mismatch_rejected() {
        let err = codec().decode(&frame(0x1234, 1000)).unwrap_err();
        assert_eq!(err.reason(), "sync_mismatch");
    }

    #[test]
    fn test_bundled_config_round_trip() {
        let blueprint = config_loader::ConfigLoader::load_from_path(std::path::Path::new(
            concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/telemetry.toml"),
        ))
        .unwrap();
        let codec = frame_codec::FrameCodec::new(std::sync::Arc::new(blueprint.schema));
        assert_eq!(codec.frame_len(), 20);

        let mut source = ingestion::SimulatedFrameSource::new(
            codec.clone(),
            ingestion::SimulationConfig {
                seed: Some(7),
                ..Default::default()
            },
        );
        let raw = source.generate_frame().unwrap();
        let record = codec.decode(&raw).unwrap();
        assert_eq!(codec.encode(&record).unwrap(), raw);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use contracts::DeliveryMode;
    use dispatcher::{
        DispatchError, DispatchPipeline, FileLogConfig, FileLogHandler, RunOutcome,
        ShutdownCoordinator,
    };
    use ingestion::ChannelFrameSource;

    use super::support::{codec, frame, settings, Calls, CountingHandler};

    /// End-to-end: channel source -> codec -> file handler (JSON Lines)
    #[tokio::test]
    async fn test_e2e_file_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry_log.jsonl");

        let (tx, mut source) = ChannelFrameSource::bounded(8, None);
        for raw in [1000, 1005, 1010] {
            tx.send(frame(0xABCD, raw)).await.unwrap();
        }

        let mut pipeline = DispatchPipeline::new(codec(), settings(3));
        pipeline.register(FileLogHandler::new("file", FileLogConfig { path: path.clone() }), 16);

        let summary = pipeline
            .run(&mut source, &ShutdownCoordinator::new())
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::MaxFramesReached);
        assert_eq!(summary.frames_decoded, 3);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);

        let first = &lines[0];
        assert_eq!(first["raw_frame_hex"], "ABCD000003E8");
        assert_eq!(first["decoded_payload"]["sync_word"], 0xABCD);
        assert_eq!(first["decoded_payload"]["altitude_unit"], "m");
        let altitude = first["decoded_payload"]["altitude"].as_f64().unwrap();
        assert!((altitude - 100.0).abs() < 1e-9);
        assert!(first["processing_timestamp_utc"].as_str().unwrap().ends_with('Z'));
        assert!(first["source_timestamp_s"].is_null());

        let last = lines[2]["decoded_payload"]["altitude"].as_f64().unwrap();
        assert!((last - 101.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sync_mismatch_never_reaches_handlers() {
        let (tx, mut source) = ChannelFrameSource::bounded(8, None);
        tx.send(frame(0x0000, 1)).await.unwrap();
        tx.send(frame(0xFFFF, 2)).await.unwrap();
        drop(tx);

        let (handler, calls) = CountingHandler::new("counter", DeliveryMode::Blocking);
        let mut pipeline = DispatchPipeline::new(codec(), settings(0));
        pipeline.register(handler, 8);

        let summary = pipeline
            .run(&mut source, &ShutdownCoordinator::new())
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::SourceExhausted);
        assert_eq!(summary.frames_rejected, 2);
        assert_eq!(summary.frames_decoded, 0);
        assert_eq!(Calls::get(&calls.handled), 0);
        assert_eq!(Calls::get(&calls.teardown), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_isolated() {
        let (tx, mut source) = ChannelFrameSource::bounded(8, None);
        for raw in 0..4 {
            tx.send(frame(0xABCD, raw)).await.unwrap();
        }

        let (broken, broken_calls) = CountingHandler::new("broken", DeliveryMode::Blocking);
        let (healthy, healthy_calls) = CountingHandler::new("healthy", DeliveryMode::NonBlocking);
        let mut pipeline = DispatchPipeline::new(codec(), settings(4));
        pipeline.register(broken.failing(), 8).register(healthy, 8);

        let summary = pipeline
            .run(&mut source, &ShutdownCoordinator::new())
            .await
            .unwrap();

        assert_eq!(Calls::get(&healthy_calls.handled), 4);
        assert_eq!(Calls::get(&broken_calls.handled), 4);
        let (_, broken_metrics) = summary
            .handlers
            .iter()
            .find(|(name, _)| name == "broken")
            .unwrap();
        assert_eq!(broken_metrics.failed, 4);
        let (_, healthy_metrics) = summary
            .handlers
            .iter()
            .find(|(name, _)| name == "healthy")
            .unwrap();
        assert_eq!(healthy_metrics.delivered, 4);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_once() {
        // Sender kept alive: the source blocks until shutdown
        let (_tx, mut source) = ChannelFrameSource::bounded(8, None);
        let (first, first_calls) = CountingHandler::new("first", DeliveryMode::Blocking);
        let (second, second_calls) = CountingHandler::new("second", DeliveryMode::NonBlocking);

        let mut pipeline = DispatchPipeline::new(codec(), settings(0));
        pipeline.register(first, 8).register(second, 8);

        let shutdown = ShutdownCoordinator::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.signal();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&mut source, &shutdown),
        )
        .await
        .expect("pipeline should stop on shutdown")
        .unwrap();

        assert_eq!(summary.outcome, RunOutcome::ShutdownRequested);
        for calls in [&first_calls, &second_calls] {
            assert_eq!(Calls::get(&calls.setup), 1);
            assert_eq!(Calls::get(&calls.teardown), 1);
        }
    }

    #[tokio::test]
    async fn test_no_handlers_is_an_error() {
        let (_tx, mut source) = ChannelFrameSource::bounded(1, None);
        let pipeline = DispatchPipeline::new(codec(), settings(1));
        let err = pipeline
            .run(&mut source, &ShutdownCoordinator::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoActiveHandlers));
    }
}

#[cfg(test)]
mod broadcast_tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use dispatcher::{
        BroadcastConfig, BroadcastHandler, DispatchPipeline, RunOutcome, ShutdownCoordinator,
    };
    use futures_util::StreamExt;
    use ingestion::ChannelFrameSource;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    use super::support::{codec, frame, settings};

    fn free_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    /// End-to-end: channel source -> pipeline -> WebSocket consumer
    #[tokio::test]
    async fn test_e2e_websocket_consumer() {
        let addr = free_addr();
        let config = BroadcastConfig {
            addr,
            ..Default::default()
        };

        let (tx, mut source) = ChannelFrameSource::bounded(8, None);
        let mut pipeline = DispatchPipeline::new(codec(), settings(2));
        pipeline.register(BroadcastHandler::new("live", config), 16);
        let run = tokio::spawn(async move {
            pipeline.run(&mut source, &ShutdownCoordinator::new()).await
        });

        let url = format!("ws://{addr}");
        let mut ws = None;
        for _ in 0..50 {
            if let Ok((stream, _)) = connect_async(url.as_str()).await {
                ws = Some(stream);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let mut ws = ws.expect("broadcast listener should accept connections");
        // Let the consumer join before anything is published
        tokio::time::sleep(Duration::from_millis(100)).await;

        tx.send(frame(0xABCD, 1000)).await.unwrap();
        tx.send(frame(0xABCD, 2000)).await.unwrap();

        let mut altitudes = Vec::new();
        while altitudes.len() < 2 {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("record should arrive")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                altitudes.push(value["decoded_payload"]["altitude"].as_f64().unwrap());
            }
        }
        assert!((altitudes[0] - 100.0).abs() < 1e-9);
        assert!((altitudes[1] - 200.0).abs() < 1e-9);

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.outcome, RunOutcome::MaxFramesReached);

        // Teardown closes the consumer connection
        let closed = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_overflowing_broadcast_counts_dropped() {
        let config = BroadcastConfig {
            addr: free_addr(),
            queue_capacity: 1,
            ..Default::default()
        };

        // Frames are ready up front and pacing is off, so the producer never
        // yields to the broadcast loop while publishing
        let (tx, mut source) = ChannelFrameSource::bounded(32, None);
        for raw in 0..32 {
            tx.send(frame(0xABCD, raw)).await.unwrap();
        }

        let mut pipeline = DispatchPipeline::new(codec(), settings(32));
        pipeline.register(BroadcastHandler::new("live", config), 16);
        let summary = pipeline
            .run(&mut source, &ShutdownCoordinator::new())
            .await
            .unwrap();

        let (_, live) = summary
            .handlers
            .iter()
            .find(|(name, _)| name == "live")
            .unwrap();
        assert!(live.dropped > 0, "overflow must show up as dropped");
        assert_eq!(live.failed, 0);
        assert_eq!(live.delivered + live.dropped, 32);
    }

    #[tokio::test]
    async fn test_broadcast_drops_newest_without_blocking() {
        let (hub, broadcast_loop) = dispatcher::BroadcastHub::new(1);
        assert!(hub.publish("first".into()));
        assert!(!hub.publish("second".into()));
        assert_eq!(hub.stats().snapshot().dropped, 1);

        let task = tokio::spawn(broadcast_loop.run());
        hub.stop().await;
        task.await.unwrap();
    }
}
