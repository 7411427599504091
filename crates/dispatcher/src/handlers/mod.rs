//! Handler implementations
//!
//! Contains ConsoleHandler, FileLogHandler and BroadcastHandler.

mod broadcast;
mod console;
mod file;

pub use self::broadcast::{BroadcastConfig, BroadcastHandler, DEFAULT_ADDR, DEFAULT_CLIENT_BUFFER};
pub use self::console::ConsoleHandler;
pub use self::file::{FileLogConfig, FileLogHandler, DEFAULT_LOG_PATH};

use contracts::{HandlerConfig, HandlerType, PipelineSettings};
use tracing::instrument;

use crate::error::DispatchError;
use crate::handle::BoxedHandler;

/// Create a handler from configuration
///
/// Only builds the handler; resources are acquired by `setup`.
#[instrument(
    name = "dispatcher_create_handler",
    skip(config, settings),
    fields(handler = %config.name, handler_type = ?config.handler_type)
)]
pub fn create_handler(
    config: &HandlerConfig,
    settings: &PipelineSettings,
) -> Result<BoxedHandler, DispatchError> {
    match config.handler_type {
        HandlerType::Console => {
            let handler = ConsoleHandler::from_params(&config.name, &config.params)
                .map_err(|e| DispatchError::handler_creation(&config.name, e))?;
            Ok(Box::new(handler))
        }
        HandlerType::File => Ok(Box::new(FileLogHandler::from_params(
            &config.name,
            &config.params,
        ))),
        HandlerType::Broadcast => {
            let broadcast = BroadcastConfig::from_params(&config.params, settings, config.queue_capacity)
                .map_err(|e| DispatchError::handler_creation(&config.name, e))?;
            Ok(Box::new(BroadcastHandler::new(&config.name, broadcast)))
        }
    }
}
