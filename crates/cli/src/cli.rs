//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry Relay - decode binary telemetry frames and fan them out to handlers
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-relay",
    author,
    version,
    about = "Binary telemetry frame decoder and relay",
    long_about = "Decodes fixed-layout binary telemetry frames described by a schema file \n\
                  and dispatches every decoded record to the configured handlers \n\
                  (console, JSON Lines file, live WebSocket broadcast)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay
    Run(RunArgs),

    /// Validate a schema/config file without running
    Validate(ValidateArgs),

    /// Display the frame layout and handler configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "configs/telemetry.toml",
        env = "TELEMETRY_RELAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Frame source
    #[arg(long, value_enum, default_value = "simulated", env = "TELEMETRY_RELAY_SOURCE")]
    pub source: SourceKind,

    /// Recorded frames (hex or JSON Lines), required with `--source replay`
    #[arg(long, required_if_eq("source", "replay"), env = "TELEMETRY_RELAY_REPLAY_FILE")]
    pub replay_file: Option<PathBuf>,

    /// Override `pipeline.max_frames` (0 = unlimited)
    #[arg(long, env = "TELEMETRY_RELAY_MAX_FRAMES")]
    pub max_frames: Option<u64>,

    /// Override `pipeline.frame_interval_ms`
    #[arg(long, env = "TELEMETRY_RELAY_FRAME_INTERVAL_MS")]
    pub frame_interval_ms: Option<u64>,

    /// Override the path of every file handler
    #[arg(long, env = "TELEMETRY_RELAY_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Seed for the simulated source (random when omitted)
    #[arg(long, env = "TELEMETRY_RELAY_SEED")]
    pub seed: Option<u64>,

    /// Probability that a simulated pull returns nothing
    #[arg(long, default_value = "0.0")]
    pub failure_rate: f64,

    /// Probability that a simulated frame has a corrupted sync word
    #[arg(long, default_value = "0.0")]
    pub corrupt_rate: f64,

    /// Stop after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TELEMETRY_RELAY_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "configs/telemetry.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/telemetry.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show handler configuration
    #[arg(long)]
    pub handlers: bool,
}

/// Frame source selection
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Random frames generated from the schema
    #[default]
    Simulated,
    /// Frames read from a recording
    Replay,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
