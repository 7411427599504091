//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::TelemetryBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    frame: FrameInfo,
    fields: Vec<FieldInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    handlers: Vec<HandlerInfo>,
    pipeline: PipelineInfo,
}

#[derive(Serialize)]
struct FrameInfo {
    sync_word: String,
    byte_order: String,
    total_length: usize,
}

#[derive(Serialize)]
struct FieldInfo {
    name: String,
    offset: usize,
    length: usize,
    encoding: String,
    scale_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
}

#[derive(Serialize)]
struct HandlerInfo {
    name: String,
    handler_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

#[derive(Serialize)]
struct PipelineInfo {
    max_frames: u64,
    frame_interval_ms: u64,
    handler_timeout_ms: u64,
    source_timestamp_field: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn field_role(field: &contracts::FieldDescriptor) -> Option<&'static str> {
    if field.is_sync_word {
        Some("sync")
    } else if field.is_checksum {
        Some("checksum")
    } else {
        None
    }
}

fn build_config_info(blueprint: &TelemetryBlueprint, args: &InfoArgs) -> ConfigInfo {
    let schema = &blueprint.schema;

    let fields = schema
        .fields_by_offset()
        .into_iter()
        .map(|f| FieldInfo {
            name: f.name.to_string(),
            offset: f.offset,
            length: f.length,
            encoding: f.binary_encoding.to_string(),
            scale_factor: f.scale_factor,
            unit: f.unit().map(str::to_string),
            role: field_role(f),
        })
        .collect();

    let handlers = if args.handlers {
        blueprint
            .effective_handlers()
            .into_iter()
            .map(|h| HandlerInfo {
                name: h.name,
                handler_type: format!("{:?}", h.handler_type),
                queue_capacity: h.queue_capacity,
                params: h.params,
            })
            .collect()
    } else {
        Vec::new()
    };

    let pipeline = &blueprint.pipeline;
    ConfigInfo {
        frame: FrameInfo {
            sync_word: format!("{:#06X}", schema.sync_word),
            byte_order: String::from(schema.byte_order),
            total_length: schema.total_length,
        },
        fields,
        handlers,
        pipeline: PipelineInfo {
            max_frames: pipeline.max_frames,
            frame_interval_ms: pipeline.frame_interval_ms,
            handler_timeout_ms: pipeline.handler_timeout_ms,
            source_timestamp_field: pipeline.source_timestamp_field.clone(),
        },
    }
}

fn print_config_info(blueprint: &TelemetryBlueprint, args: &InfoArgs) {
    let schema = &blueprint.schema;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Telemetry Relay Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📦 Frame");
    println!("   ├─ Sync word: {:#06X}", schema.sync_word);
    println!("   ├─ Byte order: {}", String::from(schema.byte_order));
    println!("   └─ Length: {} bytes", schema.total_length);

    let fields = schema.fields_by_offset();
    println!("\n📐 Fields ({})", fields.len());
    for (i, field) in fields.iter().enumerate() {
        let prefix = if i == fields.len() - 1 { "└─" } else { "├─" };
        let role = field_role(field).map(|r| format!(" [{r}]")).unwrap_or_default();
        let unit = field.unit().map(|u| format!(" {u}")).unwrap_or_default();
        println!(
            "   {} [{:>3}..{:<3}] {:<20} {:<8} x{}{}{}",
            prefix,
            field.offset,
            field.end().unwrap_or(field.offset),
            field.name.as_str(),
            field.binary_encoding.to_string(),
            field.scale_factor,
            unit,
            role
        );
    }

    let pipeline = &blueprint.pipeline;
    println!("\n⚙️  Pipeline");
    println!("   ├─ Max frames: {}", pipeline.max_frames);
    println!("   ├─ Frame interval: {} ms", pipeline.frame_interval_ms);
    println!("   ├─ Handler timeout: {} ms", pipeline.handler_timeout_ms);
    println!("   └─ Timestamp field: {}", pipeline.source_timestamp_field);

    let handlers = blueprint.effective_handlers();
    println!("\n📤 Handlers ({})", handlers.len());
    for (i, handler) in handlers.iter().enumerate() {
        let is_last = i == handlers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        println!("   {} {} ({:?})", prefix, handler.name, handler.handler_type);

        if args.handlers {
            let mut params: Vec<_> = handler.params.iter().collect();
            params.sort();
            println!("   {}  └─ queue_capacity = {}", child_prefix, handler.queue_capacity);
            for (key, value) in params {
                println!("   {}     {} = {}", child_prefix, key, value);
            }
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn blueprint() -> TelemetryBlueprint {
        config_loader::ConfigLoader::load_from_str(
            include_str!("../../../../configs/telemetry.toml"),
            config_loader::ConfigFormat::Toml,
        )
        .unwrap()
    }

    fn args(handlers: bool) -> InfoArgs {
        InfoArgs {
            config: PathBuf::from("configs/telemetry.toml"),
            json: true,
            handlers,
        }
    }

    #[test]
    fn test_info_field_layout() {
        let info = build_config_info(&blueprint(), &args(false));
        assert_eq!(info.frame.sync_word, "0xABCD");
        assert_eq!(info.frame.byte_order, "big");
        assert_eq!(info.fields.len(), 10);
        assert_eq!(info.fields[0].name, "sync_word");
        assert_eq!(info.fields[0].role, Some("sync"));
        assert!(info.handlers.is_empty());
    }

    #[test]
    fn test_info_json_includes_handlers_on_request() {
        let info = build_config_info(&blueprint(), &args(true));
        assert_eq!(info.handlers.len(), 3);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["handlers"][0]["handler_type"], "Console");
        assert_eq!(json["pipeline"]["source_timestamp_field"], "timestamp_s");
    }
}
