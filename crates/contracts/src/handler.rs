//! OutputHandler trait - 分发管线的输出接口
//!
//! Handlers declare how they want to be delivered to; the pipeline never
//! inspects the concrete type.

use serde::{Deserialize, Serialize};

use crate::{ContractError, RecordEnvelope};

/// How the pipeline delivers envelopes to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// `handle` may wait on I/O. The handler gets its own worker behind a
    /// bounded queue.
    Blocking,
    /// `handle` returns without waiting (bounded enqueue, drop-newest). The
    /// producer calls it inline.
    NonBlocking,
}

/// Output handler
///
/// Lifecycle: `setup` once, `handle` per envelope, `teardown` exactly once
/// (also when `setup` failed).
#[trait_variant::make(OutputHandler: Send)]
pub trait LocalOutputHandler {
    /// Handler name (used for logging/metrics)
    fn name(&self) -> &str;

    fn delivery_mode(&self) -> DeliveryMode;

    /// Acquire resources (open files, bind sockets)
    async fn setup(&mut self) -> Result<(), ContractError>;

    /// Deliver one envelope
    ///
    /// # Errors
    /// Returns a delivery error; the pipeline logs and counts it, other
    /// handlers are unaffected.
    async fn handle(&mut self, envelope: &RecordEnvelope) -> Result<(), ContractError>;

    /// Release resources
    async fn teardown(&mut self) -> Result<(), ContractError>;
}
