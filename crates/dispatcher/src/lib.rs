//! # Dispatcher
//!
//! 遥测分发模块。
//!
//! 负责：
//! - 从帧源拉取数据并解码 (`DispatchPipeline`)
//! - Fan-out 到多个 handler，按 handler 声明的投递方式隔离慢/失败的 handler
//! - 实时消费者广播 (`BroadcastHub`)
//! - 协作式关闭 (`ShutdownCoordinator`)

pub mod broadcast;
pub mod error;
pub mod handle;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod shutdown;

pub use broadcast::{
    BroadcastCommand, BroadcastHub, BroadcastStats, BroadcastStatsSnapshot, Membership,
};
pub use contracts::{DeliveryMode, OutputHandler, RecordEnvelope};
pub use error::DispatchError;
pub use handle::{BoxedHandler, DynOutputHandler, HandlerHandle};
pub use handlers::{
    create_handler, BroadcastConfig, BroadcastHandler, ConsoleHandler, FileLogConfig,
    FileLogHandler,
};
pub use metrics::{HandlerMetrics, HandlerMetricsSnapshot};
pub use pipeline::{DispatchPipeline, RunOutcome, RunSummary};
pub use retry::{Backoff, RetryPolicy};
pub use shutdown::ShutdownCoordinator;
