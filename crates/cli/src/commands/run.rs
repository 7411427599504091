//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{HandlerType, TelemetryBlueprint};
use ingestion::SimulationConfig;
use std::time::Duration;
use tracing::info;

use crate::cli::{RunArgs, SourceKind};
use crate::error::CliError;
use crate::pipeline::{Relay, RelayConfig, SourceSpec};

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);

    info!(
        frame_len = blueprint.schema.total_length,
        fields = blueprint.schema.fields.len(),
        handlers = blueprint.handlers.len(),
        max_frames = blueprint.pipeline.max_frames,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let source = source_spec(args, &blueprint)?;
    let relay = Relay::new(RelayConfig {
        blueprint,
        source,
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
    });

    info!("Starting relay...");
    let stats = relay.run().await?;

    info!(
        outcome = %stats.summary.outcome,
        frames_decoded = stats.summary.frames_decoded,
        frames_rejected = stats.summary.frames_rejected,
        duration_secs = stats.summary.duration.as_secs_f64(),
        fps = stats.fps(),
        "Relay finished"
    );
    stats.print_summary();

    Ok(())
}

/// Apply CLI overrides on top of the loaded blueprint
fn apply_overrides(blueprint: &mut TelemetryBlueprint, args: &RunArgs) {
    if let Some(max_frames) = args.max_frames {
        info!(max_frames, "Overriding max_frames from CLI");
        blueprint.pipeline.max_frames = max_frames;
    }
    if let Some(interval) = args.frame_interval_ms {
        info!(frame_interval_ms = interval, "Overriding frame interval from CLI");
        blueprint.pipeline.frame_interval_ms = interval;
    }
    if let Some(ref output) = args.output {
        // Materialize defaults so the override has a file handler to apply to
        blueprint.handlers = blueprint.effective_handlers();
        for handler in &mut blueprint.handlers {
            if handler.handler_type == HandlerType::File {
                info!(handler = %handler.name, path = %output.display(), "Overriding output path from CLI");
                handler
                    .params
                    .insert("path".to_string(), output.display().to_string());
            }
        }
    }
}

fn source_spec(args: &RunArgs, blueprint: &TelemetryBlueprint) -> Result<SourceSpec, CliError> {
    match args.source {
        SourceKind::Simulated => Ok(SourceSpec::Simulated(SimulationConfig {
            seed: args.seed,
            failure_rate: args.failure_rate,
            corrupt_rate: args.corrupt_rate,
            timestamp_field: blueprint.pipeline.source_timestamp_field.clone(),
            ..Default::default()
        })),
        SourceKind::Replay => args
            .replay_file
            .clone()
            .map(SourceSpec::Replay)
            .ok_or_else(|| CliError::source_options("--replay-file is required with --source replay")),
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &TelemetryBlueprint) {
    let schema = &blueprint.schema;
    println!("\n=== Configuration Summary ===\n");
    println!("Frame:");
    println!("  Sync word: {:#06X}", schema.sync_word);
    println!("  Byte order: {}", String::from(schema.byte_order));
    println!("  Length: {} bytes, {} fields", schema.total_length, schema.fields.len());

    let handlers = blueprint.effective_handlers();
    println!("\nHandlers ({}):", handlers.len());
    for handler in &handlers {
        println!("  - {} ({:?})", handler.name, handler.handler_type);
    }

    let pipeline = &blueprint.pipeline;
    println!("\nPipeline:");
    println!("  Max frames: {}", pipeline.max_frames);
    println!("  Frame interval: {} ms", pipeline.frame_interval_ms);
    println!(
        "  Retry: {} consecutive failures, {:?} backoff",
        pipeline.retry.max_consecutive_failures, pipeline.retry.backoff
    );

    let warnings = config_loader::ConfigLoader::warnings(blueprint);
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    println!();
}
