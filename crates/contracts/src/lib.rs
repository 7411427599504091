//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the relay.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data Model
//! - `FrameSchema` is loaded once and shared read-only behind `Arc`
//! - `DecodedRecord` / `RecordEnvelope` are produced per frame and never mutated
//!   after they enter the dispatch pipeline

mod blueprint;
mod envelope;
mod error;
mod field_name;
mod handler;
mod record;
mod schema;
mod source;

pub use blueprint::*;
pub use envelope::RecordEnvelope;
pub use error::*;
pub use field_name::FieldName;
pub use handler::{DeliveryMode, LocalOutputHandler, OutputHandler};
pub use record::{DecodedField, DecodedRecord, FieldError, FieldValue};
pub use schema::*;
pub use source::{FrameSupplier, LocalFrameSupplier};
