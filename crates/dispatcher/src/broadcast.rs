//! BroadcastHub - 向实时消费者扇出记录
//!
//! 单个有界发布队列 + 单个广播循环。消费者集合只由广播循环持有，
//! 连接/断开通过 `Membership` 消息进入循环，不会出现边遍历边修改。
//!
//! 发布是非阻塞的：队列满时丢弃最新的记录并计数。
//! 每个消费者有自己的有界 outbox，慢消费者只会丢失自己的消息。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, warn};

use observability::{record_broadcast_dropped, set_broadcast_consumers};

/// Default publish queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

pub type ConsumerId = u64;

/// Message shared by every consumer outbox
pub type Outgoing = Arc<str>;

/// Publish queue item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastCommand {
    /// One serialized record
    Publish(String),
    /// End the broadcast loop after the records queued before it
    Stop,
}

/// Consumer set changes, applied by the broadcast loop
#[derive(Debug)]
pub enum Membership {
    Join {
        id: ConsumerId,
        outbox: mpsc::Sender<Outgoing>,
    },
    Leave {
        id: ConsumerId,
    },
}

/// 广播统计
#[derive(Debug, Default)]
pub struct BroadcastStats {
    published: AtomicU64,
    dropped: AtomicU64,
    lagged: AtomicU64,
    active_consumers: AtomicUsize,
}

impl BroadcastStats {
    /// Records accepted into the publish queue
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Records dropped because the publish queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Per-consumer deliveries skipped because an outbox was full
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    pub fn active_consumers(&self) -> usize {
        self.active_consumers.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            published: self.published(),
            dropped: self.dropped(),
            lagged: self.lagged(),
            active_consumers: self.active_consumers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStatsSnapshot {
    pub published: u64,
    pub dropped: u64,
    pub lagged: u64,
    pub active_consumers: usize,
}

/// Join/leave handle given to connection tasks
#[derive(Debug, Clone)]
pub struct ConsumerRegistry {
    membership: mpsc::UnboundedSender<Membership>,
    next_id: Arc<AtomicU64>,
}

impl ConsumerRegistry {
    /// Add a consumer; records published after the join reach `outbox`
    pub fn join(&self, outbox: mpsc::Sender<Outgoing>) -> ConsumerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.membership.send(Membership::Join { id, outbox }).is_err() {
            debug!(consumer = id, "broadcast loop gone, join ignored");
        }
        id
    }

    pub fn leave(&self, id: ConsumerId) {
        // Loop already stopped: the consumer set is gone anyway
        let _ = self.membership.send(Membership::Leave { id });
    }
}

/// Publishing side of the hub
pub struct BroadcastHub {
    tx: mpsc::Sender<BroadcastCommand>,
    registry: ConsumerRegistry,
    stats: Arc<BroadcastStats>,
}

impl BroadcastHub {
    /// Create the hub and the loop that must be spawned to drive it
    pub fn new(queue_capacity: usize) -> (Self, BroadcastLoop) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (membership, membership_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(BroadcastStats::default());

        let hub = Self {
            tx,
            registry: ConsumerRegistry {
                membership,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            stats: Arc::clone(&stats),
        };
        let broadcast_loop = BroadcastLoop {
            rx,
            membership_rx,
            consumers: HashMap::new(),
            stats,
        };
        (hub, broadcast_loop)
    }

    /// Enqueue a record without waiting
    ///
    /// Returns false when the record was dropped (queue full or loop stopped).
    pub fn publish(&self, json: String) -> bool {
        match self.tx.try_send(BroadcastCommand::Publish(json)) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                record_broadcast_dropped();
                warn!(dropped, "broadcast queue full, newest record dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                record_broadcast_dropped();
                debug!("broadcast loop stopped, record dropped");
                false
            }
        }
    }

    /// Queue the stop sentinel behind the records already published
    pub async fn stop(&self) {
        if self.tx.send(BroadcastCommand::Stop).await.is_err() {
            debug!("broadcast loop already stopped");
        }
    }

    pub fn registry(&self) -> ConsumerRegistry {
        self.registry.clone()
    }

    pub fn stats(&self) -> &Arc<BroadcastStats> {
        &self.stats
    }
}

/// The loop owning the consumer set
pub struct BroadcastLoop {
    rx: mpsc::Receiver<BroadcastCommand>,
    membership_rx: mpsc::UnboundedReceiver<Membership>,
    consumers: HashMap<ConsumerId, mpsc::Sender<Outgoing>>,
    stats: Arc<BroadcastStats>,
}

impl BroadcastLoop {
    /// Run until `Stop` is received or every publisher is gone
    #[instrument(name = "broadcast_loop", skip(self))]
    pub async fn run(mut self) {
        debug!("broadcast loop started");

        loop {
            tokio::select! {
                biased;
                Some(change) = self.membership_rx.recv() => self.apply(change),
                command = self.rx.recv() => match command {
                    Some(BroadcastCommand::Publish(json)) => {
                        // Joins sent before this record was published take effect first
                        while let Ok(change) = self.membership_rx.try_recv() {
                            self.apply(change);
                        }
                        self.fan_out(json);
                    }
                    Some(BroadcastCommand::Stop) | None => break,
                },
            }
        }

        let remaining = self.consumers.len();
        self.consumers.clear();
        self.update_consumer_count();
        info!(consumers = remaining, lagged = self.stats.lagged(), "broadcast loop stopped");
    }

    fn apply(&mut self, change: Membership) {
        match change {
            Membership::Join { id, outbox } => {
                self.consumers.insert(id, outbox);
                debug!(consumer = id, total = self.consumers.len(), "consumer joined");
            }
            Membership::Leave { id } => {
                if self.consumers.remove(&id).is_some() {
                    debug!(consumer = id, total = self.consumers.len(), "consumer left");
                }
            }
        }
        self.update_consumer_count();
    }

    fn fan_out(&mut self, json: String) {
        let message: Outgoing = Arc::from(json);
        let mut closed = Vec::new();

        for (id, outbox) in &self.consumers {
            match outbox.try_send(Arc::clone(&message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.stats.lagged.fetch_add(1, Ordering::Relaxed);
                    debug!(consumer = id, "consumer outbox full, record skipped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        if !closed.is_empty() {
            for id in closed {
                self.consumers.remove(&id);
                debug!(consumer = id, "consumer outbox closed, removed");
            }
            self.update_consumer_count();
        }
    }

    fn update_consumer_count(&self) {
        self.stats
            .active_consumers
            .store(self.consumers.len(), Ordering::Relaxed);
        set_broadcast_consumers(self.consumers.len());
    }
}
