//! BroadcastHandler - 通过 WebSocket 向实时消费者推送记录
//!
//! `handle` 只做非阻塞入队，由生产者直接调用。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::{ContractError, DeliveryMode, OutputHandler, PipelineSettings, RecordEnvelope};

use crate::broadcast::{BroadcastHub, BroadcastStats, ConsumerRegistry, DEFAULT_QUEUE_CAPACITY};
use crate::error::DispatchError;

/// Default listen address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// Default per-consumer outbox size
pub const DEFAULT_CLIENT_BUFFER: usize = 32;

/// Configuration for BroadcastHandler
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub addr: SocketAddr,
    /// Per-consumer outbox capacity
    pub client_buffer: usize,
    /// Publish queue capacity
    pub queue_capacity: usize,
    /// How long teardown waits for the broadcast loop
    pub drain_grace: Duration,
    /// How long teardown waits for the listener
    pub listener_grace: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            client_buffer: DEFAULT_CLIENT_BUFFER,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_grace: settings.drain_grace(),
            listener_grace: settings.listener_grace(),
        }
    }
}

impl BroadcastConfig {
    /// Create config from params map
    pub fn from_params(
        params: &HashMap<String, String>,
        settings: &PipelineSettings,
        queue_capacity: usize,
    ) -> Result<Self, String> {
        let addr_str = params.get("addr").map_or(DEFAULT_ADDR, String::as_str);
        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{addr_str}': {e}"))?;

        let client_buffer = match params.get("client_buffer") {
            Some(raw) => raw
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or_else(|| format!("invalid client_buffer '{raw}'"))?,
            None => DEFAULT_CLIENT_BUFFER,
        };

        Ok(Self {
            addr,
            client_buffer,
            queue_capacity,
            drain_grace: settings.drain_grace(),
            listener_grace: settings.listener_grace(),
        })
    }
}

/// Handler that fans records out to WebSocket consumers
pub struct BroadcastHandler {
    name: String,
    config: BroadcastConfig,
    cancel: CancellationToken,
    hub: Option<BroadcastHub>,
    stats: Option<Arc<BroadcastStats>>,
    local_addr: Option<SocketAddr>,
    hub_task: Option<JoinHandle<()>>,
    listener_task: Option<JoinHandle<()>>,
}

impl BroadcastHandler {
    pub fn new(name: impl Into<String>, config: BroadcastConfig) -> Self {
        Self {
            name: name.into(),
            config,
            cancel: CancellationToken::new(),
            hub: None,
            stats: None,
            local_addr: None,
            hub_task: None,
            listener_task: None,
        }
    }

    /// Bound address, available after `setup`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Hub statistics, available after `setup`
    pub fn stats(&self) -> Option<&Arc<BroadcastStats>> {
        self.stats.as_ref()
    }
}

impl OutputHandler for BroadcastHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::NonBlocking
    }

    #[instrument(name = "broadcast_handler_setup", skip(self), fields(handler = %self.name))]
    async fn setup(&mut self) -> Result<(), ContractError> {
        if self.hub.is_some() {
            debug!(handler = %self.name, "broadcast already listening");
            return Ok(());
        }
        let listener = TcpListener::bind(self.config.addr).await.map_err(|e| {
            ContractError::handler_setup(&self.name, format!("bind {}: {e}", self.config.addr))
        })?;
        let local_addr = listener.local_addr()?;

        let (hub, broadcast_loop) = BroadcastHub::new(self.config.queue_capacity);
        self.hub_task = Some(tokio::spawn(broadcast_loop.run()));
        self.listener_task = Some(tokio::spawn(accept_loop(
            listener,
            hub.registry(),
            self.cancel.child_token(),
            self.config.client_buffer,
        )));
        self.stats = Some(Arc::clone(hub.stats()));
        self.hub = Some(hub);
        self.local_addr = Some(local_addr);

        info!(handler = %self.name, addr = %local_addr, "live broadcast listening");
        Ok(())
    }

    async fn handle(&mut self, envelope: &RecordEnvelope) -> Result<(), ContractError> {
        let Some(hub) = &self.hub else {
            return Err(ContractError::handler_delivery(&self.name, "broadcast not started"));
        };
        if hub.publish(envelope.to_json()?) {
            Ok(())
        } else {
            Err(ContractError::queue_overflow(&self.name))
        }
    }

    #[instrument(name = "broadcast_handler_teardown", skip(self), fields(handler = %self.name))]
    async fn teardown(&mut self) -> Result<(), ContractError> {
        let drain_grace = self.config.drain_grace;
        if let Some(hub) = self.hub.take() {
            if tokio::time::timeout(drain_grace, hub.stop()).await.is_err() {
                warn!(handler = %self.name, "broadcast queue did not accept stop");
            }
            if let Some(stats) = &self.stats {
                info!(
                    handler = %self.name,
                    published = stats.published(),
                    dropped = stats.dropped(),
                    lagged = stats.lagged(),
                    "broadcast stopping"
                );
            }
        }
        if let Some(task) = self.hub_task.take() {
            await_with_grace("broadcast loop", task, drain_grace).await;
        }

        self.cancel.cancel();
        if let Some(task) = self.listener_task.take() {
            await_with_grace("broadcast listener", task, self.config.listener_grace).await;
        }
        Ok(())
    }
}

/// Wait for a background task, abort it when the grace period runs out
async fn await_with_grace(component: &str, mut task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => debug!(component, "stopped"),
        Ok(Err(e)) => warn!(component, error = %e, "task failed"),
        Err(_) => {
            task.abort();
            let err = DispatchError::shutdown_timeout(component, grace);
            warn!(error = %err, "shutdown timeout");
        }
    }
}

#[instrument(name = "broadcast_accept_loop", skip_all)]
async fn accept_loop(
    listener: TcpListener,
    registry: ConsumerRegistry,
    cancel: CancellationToken,
    client_buffer: usize,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_consumer(
                        stream,
                        peer,
                        registry.clone(),
                        cancel.clone(),
                        client_buffer,
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }

    // Connections watch the same token and close on their own
    while connections.join_next().await.is_some() {}
    debug!("accept loop stopped");
}

async fn serve_consumer(
    stream: TcpStream,
    peer: SocketAddr,
    registry: ConsumerRegistry,
    cancel: CancellationToken,
    client_buffer: usize,
) {
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return,
        handshake = accept_async(stream) => match handshake {
            Ok(ws) => ws,
            Err(e) => {
                warn!(peer = %peer, error = %e, "WebSocket handshake failed");
                return;
            }
        },
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outbox_tx, mut outbox) = mpsc::channel(client_buffer);
    let id = registry.join(outbox_tx);
    info!(consumer = id, peer = %peer, "live consumer connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            outgoing = outbox.recv() => match outgoing {
                Some(json) => {
                    if let Err(e) = ws_tx.send(Message::Text(json.to_string())).await {
                        debug!(consumer = id, error = %e, "send failed");
                        break;
                    }
                }
                None => {
                    // Removed by the broadcast loop (stopped)
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            // Pings are answered by tungstenite on the next write or flush
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(consumer = id, error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    registry.leave(id);
    info!(consumer = id, peer = %peer, "live consumer disconnected");
}
