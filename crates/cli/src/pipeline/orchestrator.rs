//! Relay orchestrator - wires config, source, pipeline and shutdown together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::TelemetryBlueprint;
use dispatcher::{DispatchPipeline, ShutdownCoordinator};
use frame_codec::FrameCodec;
use tracing::{info, warn};

use super::{RelaySource, RelayStats, SourceSpec};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Schema, pipeline settings and handlers
    pub blueprint: TelemetryBlueprint,

    /// Frame source to drive the pipeline
    pub source: SourceSpec,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Stop after this long (None = no timeout)
    pub timeout: Option<Duration>,
}

/// Main relay orchestrator
pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Run until the pipeline stops (max frames, exhausted source, signal or timeout)
    pub async fn run(self) -> Result<RelayStats> {
        let RelayConfig {
            blueprint,
            source,
            metrics_port,
            timeout,
        } = self.config;

        if let Some(port) = metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let codec = FrameCodec::new(Arc::new(blueprint.schema.clone()));
        let mut source = RelaySource::build(&source, &codec)?;
        let pipeline =
            DispatchPipeline::from_blueprint(&blueprint).context("Failed to build handlers")?;

        info!(
            source = source.kind(),
            frame_len = codec.frame_len(),
            handlers = pipeline.handler_count(),
            "Relay starting"
        );

        let shutdown = ShutdownCoordinator::new();
        let signal_task = shutdown.listen_for_os_signals();
        let timeout_task = timeout.map(|limit| {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                if shutdown.signal() {
                    warn!(timeout_secs = limit.as_secs(), "Relay timeout reached, stopping");
                }
            })
        });

        let result = pipeline.run(&mut source, &shutdown).await;

        signal_task.abort();
        if let Some(task) = timeout_task {
            task.abort();
        }

        let summary = result.context("Relay pipeline failed")?;
        Ok(RelayStats {
            source_kind: source.kind(),
            source: source.metrics(),
            summary,
        })
    }
}
