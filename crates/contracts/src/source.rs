//! FrameSupplier trait - 帧来源接口

use bytes::Bytes;

/// Supplies raw frames, one complete frame per call.
///
/// `None` (or an empty buffer) is a transient failure; the pipeline retries
/// according to its retry policy.
#[trait_variant::make(FrameSupplier: Send)]
pub trait LocalFrameSupplier {
    async fn next_frame(&mut self) -> Option<Bytes>;
}
