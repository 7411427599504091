//! DispatchPipeline - 拉帧、解码、分发到所有 handler 的主循环
//!
//! 生命周期：setup (按注册顺序) -> 生产循环 -> drain -> teardown (每个 handler 恰好一次)。

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    DecodedRecord, FrameSupplier, OutputHandler, PipelineSettings, RecordEnvelope,
    TelemetryBlueprint,
};
use frame_codec::{FrameCodec, FrameError};
use observability::{StatsSummary, TelemetryAggregator};

use crate::error::DispatchError;
use crate::handle::{BoxedHandler, HandlerHandle};
use crate::handlers::create_handler;
use crate::metrics::HandlerMetricsSnapshot;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownCoordinator;

/// Why the producer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `max_frames` frames were decoded
    MaxFramesReached,
    /// Shutdown was signaled
    ShutdownRequested,
    /// The source failed more often in a row than the retry policy allows
    SourceExhausted,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MaxFramesReached => "max frames reached",
            Self::ShutdownRequested => "shutdown requested",
            Self::SourceExhausted => "source exhausted",
        };
        f.write_str(s)
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub source_failures: u64,
    /// Active handlers in registration order
    pub handlers: Vec<(String, HandlerMetricsSnapshot)>,
    /// Handlers whose setup failed
    pub excluded_handlers: Vec<String>,
    pub duration: Duration,
    pub decode_latency_us: StatsSummary,
}

impl RunSummary {
    /// Envelopes lost across all handlers (dropped or timed out)
    pub fn envelopes_lost(&self) -> u64 {
        self.handlers.iter().map(|(_, m)| m.lost()).sum()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Outcome: {}", self.outcome)?;
        writeln!(f, "Duration: {:.2}s", self.duration.as_secs_f64())?;
        writeln!(f, "Frames decoded: {}", self.frames_decoded)?;
        writeln!(f, "Frames rejected: {}", self.frames_rejected)?;
        writeln!(f, "Source failures: {}", self.source_failures)?;
        writeln!(f, "Decode latency (us): {}", self.decode_latency_us)?;
        for (name, metrics) in &self.handlers {
            writeln!(f, "Handler {name}: {metrics}")?;
        }
        for name in &self.excluded_handlers {
            writeln!(f, "Handler {name}: excluded (setup failed)")?;
        }
        Ok(())
    }
}

struct Registration {
    handler: BoxedHandler,
    queue_capacity: usize,
}

enum Slot {
    Active(HandlerHandle),
    Excluded(BoxedHandler),
}

/// 分发管线
///
/// 编解码器、handler、`max_frames` 和重试策略在构造时给定；`run` 消费管线。
pub struct DispatchPipeline {
    codec: FrameCodec,
    settings: PipelineSettings,
    retry: RetryPolicy,
    registrations: Vec<Registration>,
}

impl DispatchPipeline {
    pub fn new(codec: FrameCodec, settings: PipelineSettings) -> Self {
        let retry = RetryPolicy::from(&settings.retry);
        Self {
            codec,
            settings,
            retry,
            registrations: Vec::new(),
        }
    }

    /// Build the codec and every configured handler from a blueprint
    #[instrument(name = "pipeline_from_blueprint", skip(blueprint))]
    pub fn from_blueprint(blueprint: &TelemetryBlueprint) -> Result<Self, DispatchError> {
        let codec = FrameCodec::new(Arc::new(blueprint.schema.clone()));
        let mut pipeline = Self::new(codec, blueprint.pipeline.clone());
        for config in blueprint.effective_handlers() {
            let handler = create_handler(&config, &blueprint.pipeline)?;
            pipeline.register_boxed(handler, config.queue_capacity);
        }
        Ok(pipeline)
    }

    /// Register a handler; setup and teardown follow registration order
    pub fn register<H: OutputHandler + 'static>(&mut self, handler: H, queue_capacity: usize) -> &mut Self {
        self.register_boxed(Box::new(handler), queue_capacity)
    }

    pub fn register_boxed(&mut self, handler: BoxedHandler, queue_capacity: usize) -> &mut Self {
        self.registrations.push(Registration {
            handler,
            queue_capacity,
        });
        self
    }

    pub fn handler_count(&self) -> usize {
        self.registrations.len()
    }

    /// Run until `max_frames` frames are decoded, the source is exhausted or
    /// shutdown is signaled
    ///
    /// # Errors
    /// `NoActiveHandlers` when every handler fails setup; no frame is pulled
    /// in that case.
    #[instrument(
        name = "pipeline_run",
        skip(self, source, shutdown),
        fields(handlers = self.registrations.len(), max_frames = self.settings.max_frames)
    )]
    pub async fn run<S: FrameSupplier>(
        self,
        source: &mut S,
        shutdown: &ShutdownCoordinator,
    ) -> Result<RunSummary, DispatchError> {
        let started = Instant::now();
        let Self {
            codec,
            settings,
            retry,
            registrations,
        } = self;

        let (mut slots, excluded_handlers) =
            setup_handlers(registrations, settings.handler_timeout()).await;

        if !slots.iter().any(|s| matches!(s, Slot::Active(_))) {
            error!("every handler failed setup, nothing to deliver to");
            teardown_handlers(drain_handlers(slots).await.0).await;
            return Err(DispatchError::NoActiveHandlers);
        }

        info!(
            active = slots.len() - excluded_handlers.len(),
            excluded = excluded_handlers.len(),
            "pipeline started"
        );

        let mut aggregator = TelemetryAggregator::new();
        let mut consecutive_failures: u32 = 0;
        let mut pulled: u64 = 0;

        let outcome = loop {
            if settings.max_frames > 0 && aggregator.frames_decoded >= settings.max_frames {
                break RunOutcome::MaxFramesReached;
            }
            if shutdown.is_signaled() {
                break RunOutcome::ShutdownRequested;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break RunOutcome::ShutdownRequested,
                frame = source.next_frame() => frame,
            };

            let frame = match next.filter(|f| !f.is_empty()) {
                Some(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                None => {
                    consecutive_failures += 1;
                    aggregator.on_source_failure();
                    if retry.exhausted(consecutive_failures) {
                        warn!(
                            failures = consecutive_failures,
                            "source failed too many times in a row, stopping"
                        );
                        break RunOutcome::SourceExhausted;
                    }
                    let delay = retry.delay(consecutive_failures);
                    debug!(
                        failures = consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "source returned no frame, retrying"
                    );
                    if !shutdown.sleep(delay).await {
                        break RunOutcome::ShutdownRequested;
                    }
                    continue;
                }
            };

            pulled += 1;
            match decode_off_scheduler(&codec, frame).await {
                Ok((frame, record, latency)) => {
                    aggregator.on_decoded(latency.as_secs_f64() * 1e6, record.invalid_count());
                    let envelope = Arc::new(RecordEnvelope::new(
                        &frame,
                        record,
                        &settings.source_timestamp_field,
                    ));
                    deliver_all(&mut slots, &envelope).await;
                    if pulled % 100 == 0 {
                        debug!(frame = pulled, decoded = aggregator.frames_decoded, "pipeline progress");
                    }
                }
                Err(reason) => aggregator.on_rejected(reason),
            }

            if settings.max_frames > 0 && aggregator.frames_decoded >= settings.max_frames {
                continue;
            }
            if !shutdown.sleep(settings.frame_interval()).await {
                break RunOutcome::ShutdownRequested;
            }
        };

        info!(%outcome, frames = pulled, "producer loop finished, draining handlers");

        let (handlers, handler_metrics) = drain_handlers(slots).await;
        teardown_handlers(handlers).await;

        let stats = aggregator.summary();
        let summary = RunSummary {
            outcome,
            frames_decoded: stats.frames_decoded,
            frames_rejected: stats.frames_rejected,
            source_failures: stats.source_failures,
            handlers: handler_metrics,
            excluded_handlers,
            duration: started.elapsed(),
            decode_latency_us: stats.decode_latency_us,
        };

        info!(
            outcome = %summary.outcome,
            decoded = summary.frames_decoded,
            rejected = summary.frames_rejected,
            source_failures = summary.source_failures,
            lost = summary.envelopes_lost(),
            "pipeline finished"
        );

        Ok(summary)
    }
}

/// Set up handlers in registration order; failures are excluded, not fatal
async fn setup_handlers(
    registrations: Vec<Registration>,
    timeout: Duration,
) -> (Vec<Slot>, Vec<String>) {
    let mut slots = Vec::with_capacity(registrations.len());
    let mut excluded = Vec::new();

    for Registration {
        mut handler,
        queue_capacity,
    } in registrations
    {
        match handler.setup().await {
            Ok(()) => {
                debug!(handler = %handler.name(), mode = ?handler.delivery_mode(), "handler ready");
                slots.push(Slot::Active(HandlerHandle::start(handler, queue_capacity, timeout)));
            }
            Err(e) => {
                error!(handler = %handler.name(), error = %e, "handler setup failed, excluded from this run");
                excluded.push(handler.name().to_string());
                slots.push(Slot::Excluded(handler));
            }
        }
    }

    (slots, excluded)
}

/// Start delivery to every active handler before the next frame is pulled
async fn deliver_all(slots: &mut [Slot], envelope: &Arc<RecordEnvelope>) {
    join_all(slots.iter_mut().filter_map(|slot| match slot {
        Slot::Active(handle) => Some(handle.deliver(envelope)),
        Slot::Excluded(_) => None,
    }))
    .await;
}

/// Close every worker queue and wait for the queues to drain
async fn drain_handlers(slots: Vec<Slot>) -> (Vec<BoxedHandler>, Vec<(String, HandlerMetricsSnapshot)>) {
    let drained = join_all(slots.into_iter().map(|slot| async move {
        match slot {
            Slot::Active(handle) => {
                let name = handle.name().to_string();
                let metrics = Arc::clone(handle.metrics());
                let handler = handle.finish().await;
                (handler, Some((name, metrics.snapshot())))
            }
            Slot::Excluded(handler) => (Some(handler), None),
        }
    }))
    .await;

    let mut handlers = Vec::with_capacity(drained.len());
    let mut metrics = Vec::new();
    for (handler, snapshot) in drained {
        handlers.extend(handler);
        metrics.extend(snapshot);
    }
    (handlers, metrics)
}

/// Teardown each handler once, in registration order; failures are isolated
async fn teardown_handlers(handlers: Vec<BoxedHandler>) {
    for mut handler in handlers {
        match handler.teardown().await {
            Ok(()) => debug!(handler = %handler.name(), "handler torn down"),
            Err(e) => error!(handler = %handler.name(), error = %e, "handler teardown failed"),
        }
    }
}

/// Decode on the blocking pool; rejected frames yield their reason label
async fn decode_off_scheduler(
    codec: &FrameCodec,
    frame: Bytes,
) -> Result<(Bytes, DecodedRecord, Duration), &'static str> {
    let codec = codec.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let result = codec.decode(&frame);
        (frame, result, start.elapsed())
    })
    .await;

    match joined {
        Ok((frame, Ok(record), latency)) => Ok((frame, record, latency)),
        Ok((frame, Err(e), _)) => {
            log_rejection(&frame, &e);
            Err(e.reason())
        }
        Err(e) => {
            error!(error = %e, "decode task failed");
            Err("decode_panic")
        }
    }
}

fn log_rejection(frame: &[u8], error: &FrameError) {
    warn!(reason = error.reason(), len = frame.len(), error = %error, "frame rejected");
}
