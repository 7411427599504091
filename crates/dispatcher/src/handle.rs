//! HandlerHandle - delivers envelopes to one handler according to its delivery mode

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{ContractError, DeliveryMode, OutputHandler, RecordEnvelope};
use observability::{record_handler_delivery, record_handler_queue_len, DeliveryStatus};

use crate::metrics::HandlerMetrics;

/// Object-safe view of an [`OutputHandler`], so handlers of different types can
/// share one pipeline.
pub trait DynOutputHandler: Send {
    fn name(&self) -> &str;

    fn delivery_mode(&self) -> DeliveryMode;

    fn setup(&mut self) -> BoxFuture<'_, Result<(), ContractError>>;

    fn handle<'a>(
        &'a mut self,
        envelope: &'a RecordEnvelope,
    ) -> BoxFuture<'a, Result<(), ContractError>>;

    fn teardown(&mut self) -> BoxFuture<'_, Result<(), ContractError>>;
}

impl<T: OutputHandler + 'static> DynOutputHandler for T {
    fn name(&self) -> &str {
        OutputHandler::name(self)
    }

    fn delivery_mode(&self) -> DeliveryMode {
        OutputHandler::delivery_mode(self)
    }

    fn setup(&mut self) -> BoxFuture<'_, Result<(), ContractError>> {
        Box::pin(OutputHandler::setup(self))
    }

    fn handle<'a>(
        &'a mut self,
        envelope: &'a RecordEnvelope,
    ) -> BoxFuture<'a, Result<(), ContractError>> {
        Box::pin(OutputHandler::handle(self, envelope))
    }

    fn teardown(&mut self) -> BoxFuture<'_, Result<(), ContractError>> {
        Box::pin(OutputHandler::teardown(self))
    }
}

/// Type-erased handler owned by the pipeline
pub type BoxedHandler = Box<dyn DynOutputHandler>;

enum Delivery {
    /// Called inline by the producer
    Inline(BoxedHandler),
    /// Own worker task behind a bounded queue; the worker hands the handler
    /// back when the queue closes
    Worker {
        tx: mpsc::Sender<Arc<RecordEnvelope>>,
        worker: JoinHandle<BoxedHandler>,
    },
}

/// Handle to an active handler
pub struct HandlerHandle {
    name: String,
    metrics: Arc<HandlerMetrics>,
    timeout: Duration,
    delivery: Delivery,
}

impl HandlerHandle {
    /// Start delivering to `handler` (already set up)
    ///
    /// Blocking handlers get a worker task and a queue of `queue_capacity`
    /// envelopes. `timeout` bounds how long the producer waits for queue
    /// space, or for an inline `handle` call.
    pub fn start(handler: BoxedHandler, queue_capacity: usize, timeout: Duration) -> Self {
        let name = handler.name().to_string();
        let metrics = Arc::new(HandlerMetrics::new());

        let delivery = match handler.delivery_mode() {
            DeliveryMode::NonBlocking => Delivery::Inline(handler),
            DeliveryMode::Blocking => {
                let (tx, rx) = mpsc::channel(queue_capacity.max(1));
                let worker_metrics = Arc::clone(&metrics);
                let worker_name = name.clone();
                let worker = tokio::spawn(async move {
                    handler_worker(handler, rx, worker_metrics, worker_name).await
                });
                Delivery::Worker { tx, worker }
            }
        };

        debug!(handler = %name, inline = matches!(delivery, Delivery::Inline(_)), "handler started");

        Self {
            name,
            metrics,
            timeout,
            delivery,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<HandlerMetrics> {
        &self.metrics
    }

    /// Deliver one envelope
    ///
    /// Never fails: errors, drops and timeouts are logged and counted.
    pub async fn deliver(&mut self, envelope: &Arc<RecordEnvelope>) {
        match &mut self.delivery {
            Delivery::Inline(handler) => {
                match tokio::time::timeout(self.timeout, handler.handle(envelope)).await {
                    Ok(Ok(())) => {
                        self.metrics.inc_delivered();
                        record_handler_delivery(&self.name, DeliveryStatus::Delivered);
                    }
                    Ok(Err(e)) if e.is_drop() => {
                        self.metrics.inc_dropped();
                        record_handler_delivery(&self.name, DeliveryStatus::Dropped);
                        debug!(handler = %self.name, "handler shed envelope");
                    }
                    Ok(Err(e)) => {
                        self.metrics.inc_failed();
                        record_handler_delivery(&self.name, DeliveryStatus::Failed);
                        error!(handler = %self.name, error = %e, "delivery failed");
                    }
                    Err(_) => {
                        self.metrics.inc_timed_out();
                        record_handler_delivery(&self.name, DeliveryStatus::TimedOut);
                        warn!(handler = %self.name, timeout_ms = self.timeout.as_millis() as u64, "inline delivery timed out");
                    }
                }
            }
            Delivery::Worker { tx, .. } => {
                match tx.send_timeout(Arc::clone(envelope), self.timeout).await {
                    Ok(()) => {
                        let queued = tx.max_capacity() - tx.capacity();
                        self.metrics.set_queue_len(queued);
                        record_handler_queue_len(&self.name, queued);
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        self.metrics.inc_timed_out();
                        record_handler_delivery(&self.name, DeliveryStatus::TimedOut);
                        warn!(
                            handler = %self.name,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "queue full, envelope dropped"
                        );
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        self.metrics.inc_dropped();
                        record_handler_delivery(&self.name, DeliveryStatus::Dropped);
                        error!(handler = %self.name, "handler worker closed unexpectedly");
                    }
                }
            }
        }
    }

    /// Close the queue, wait for the worker to drain it and get the handler back
    ///
    /// Returns `None` if the worker panicked.
    #[instrument(name = "handler_handle_finish", skip(self), fields(handler = %self.name))]
    pub async fn finish(self) -> Option<BoxedHandler> {
        match self.delivery {
            Delivery::Inline(handler) => Some(handler),
            Delivery::Worker { tx, worker } => {
                drop(tx);
                match worker.await {
                    Ok(handler) => {
                        debug!(handler = %self.name, "handler drained");
                        Some(handler)
                    }
                    Err(e) => {
                        error!(handler = %self.name, error = ?e, "handler worker panicked");
                        None
                    }
                }
            }
        }
    }
}

/// Worker task that consumes envelopes in FIFO order
#[instrument(
    name = "handler_worker_loop",
    skip(handler, rx, metrics),
    fields(handler = %name)
)]
async fn handler_worker(
    mut handler: BoxedHandler,
    mut rx: mpsc::Receiver<Arc<RecordEnvelope>>,
    metrics: Arc<HandlerMetrics>,
    name: String,
) -> BoxedHandler {
    debug!(handler = %name, "handler worker started");

    while let Some(envelope) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match handler.handle(&envelope).await {
            Ok(()) => {
                metrics.inc_delivered();
                record_handler_delivery(&name, DeliveryStatus::Delivered);
            }
            Err(e) if e.is_drop() => {
                metrics.inc_dropped();
                record_handler_delivery(&name, DeliveryStatus::Dropped);
                debug!(handler = %name, "handler shed envelope");
            }
            Err(e) => {
                metrics.inc_failed();
                record_handler_delivery(&name, DeliveryStatus::Failed);
                error!(handler = %name, error = %e, "delivery failed");
            }
        }
    }

    debug!(handler = %name, "handler worker stopped");
    handler
}
