//! # Ingestion
//!
//! Frame sources feeding the dispatch pipeline.
//!
//! Every source implements `contracts::FrameSupplier`: one complete frame per
//! pull, `None` for a transient failure.
//!
//! - `SimulatedFrameSource`: random telemetry encoded against the schema
//! - `ReplayFrameSource`: recorded frames (hex lines or JSONL records)
//! - `ChannelFrameSource`: frames pushed by another task
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{SimulatedFrameSource, SimulationConfig};
//!
//! let mut source = SimulatedFrameSource::new(codec, SimulationConfig::default());
//! let frame = source.next_frame().await;
//! ```

mod channel;
mod error;
mod metrics;
mod replay;
mod simulated;

// Re-exports
pub use channel::ChannelFrameSource;
pub use contracts::FrameSupplier;
pub use error::{IngestionError, Result};
pub use metrics::{SourceMetrics, SourceMetricsSnapshot};
pub use replay::ReplayFrameSource;
pub use simulated::{SimulatedFrameSource, SimulationConfig};
