//! Relay orchestration module.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{Relay, RelayConfig};
pub use source::{RelaySource, SourceSpec};
pub use stats::RelayStats;
