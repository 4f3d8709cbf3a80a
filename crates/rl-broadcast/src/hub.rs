//! Subscriber registry and fan-out.
//!
//! One task owns the registry. Register, unregister and broadcast arrive as
//! commands on a bounded queue, so no lock is ever held across a send and a
//! slow subscriber can only ever lose its own messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use rl_schemas::{BroadcastMessage, ReportBatch, SlowClientPolicy};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type ClientId = u64;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub client_queue_capacity: usize,
    pub command_queue_capacity: usize,
    pub slow_client_policy: SlowClientPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: 64,
            command_queue_capacity: 256,
            slow_client_policy: SlowClientPolicy::Disconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub connected_clients: usize,
    /// Highest seq handed to the hub for fan-out. Observational only.
    pub last_broadcast_seq: i64,
    /// Messages a slow subscriber failed to accept (disconnects + skips).
    pub slow_client_events: u64,
}

enum HubCommand {
    Register {
        id: ClientId,
        tx: mpsc::Sender<Arc<str>>,
    },
    Unregister {
        id: ClientId,
    },
    Broadcast {
        batch: ReportBatch,
    },
    Sync {
        reply: oneshot::Sender<HubStats>,
    },
}

/// A live subscription. The stream ends (`recv` returns `None`) when the hub
/// drops this client or shuts down.
#[derive(Debug)]
pub struct ClientSubscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Cloneable front door to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    stats: watch::Receiver<HubStats>,
    next_id: Arc<AtomicU64>,
    client_queue_capacity: usize,
}

impl HubHandle {
    pub async fn register(&self) -> Result<ClientSubscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.client_queue_capacity);
        self.commands
            .send(HubCommand::Register { id, tx })
            .await
            .map_err(|_| anyhow!("broadcast hub is not running"))?;
        Ok(ClientSubscription { id, receiver })
    }

    /// Idempotent. Unregistering after the hub stopped is not an error.
    pub async fn unregister(&self, id: ClientId) {
        let _ = self.commands.send(HubCommand::Unregister { id }).await;
    }

    pub async fn broadcast(&self, batch: ReportBatch) -> Result<()> {
        self.commands
            .send(HubCommand::Broadcast { batch })
            .await
            .map_err(|_| anyhow!("broadcast hub is not running"))
    }

    pub fn stats(&self) -> HubStats {
        *self.stats.borrow()
    }

    /// Stats after the hub has applied every command sent before this call.
    pub async fn settled(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(HubCommand::Sync { reply }).await.is_err() {
            return self.stats();
        }
        rx.await.unwrap_or_else(|_| self.stats())
    }
}

pub struct BroadcastHub {
    config: HubConfig,
    clients: HashMap<ClientId, mpsc::Sender<Arc<str>>>,
    stats: HubStats,
    stats_tx: watch::Sender<HubStats>,
    commands: mpsc::Receiver<HubCommand>,
    shutdown: watch::Receiver<bool>,
}

impl BroadcastHub {
    /// Start the hub task. It exits when `shutdown` flips to `true` or every
    /// handle is dropped; either way all subscriber streams end.
    pub fn spawn(config: HubConfig, shutdown: watch::Receiver<bool>) -> (HubHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let (stats_tx, stats_rx) = watch::channel(HubStats::default());
        let handle = HubHandle {
            commands: cmd_tx,
            stats: stats_rx,
            next_id: Arc::new(AtomicU64::new(1)),
            client_queue_capacity: config.client_queue_capacity.max(1),
        };
        let hub = BroadcastHub {
            config,
            clients: HashMap::new(),
            stats: HubStats::default(),
            stats_tx,
            commands: cmd_rx,
            shutdown,
        };
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!(policy = ?self.config.slow_client_policy, "broadcast hub started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
        }
        let dropped = self.clients.len();
        self.clients.clear();
        self.publish();
        info!(dropped_clients = dropped, "broadcast hub stopped");
    }

    fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { id, tx } => {
                self.clients.insert(id, tx);
                debug!(client_id = id, clients = self.clients.len(), "client registered");
            }
            HubCommand::Unregister { id } => {
                if self.clients.remove(&id).is_some() {
                    debug!(client_id = id, clients = self.clients.len(), "client unregistered");
                }
            }
            HubCommand::Broadcast { batch } => self.fan_out(batch),
            HubCommand::Sync { reply } => {
                self.publish();
                let _ = reply.send(self.stats);
                return;
            }
        }
        self.publish();
    }

    fn fan_out(&mut self, batch: ReportBatch) {
        let to_seq = batch.to_seq;
        let count = batch.count;
        let msg = BroadcastMessage::reports(batch, Utc::now());
        let payload: Arc<str> = match serde_json::to_string(&msg) {
            Ok(s) => Arc::from(s),
            Err(e) => {
                error!(error = %e, to_seq, "failed to serialize broadcast batch");
                return;
            }
        };

        let policy = self.config.slow_client_policy;
        let mut slow = 0u64;
        self.clients.retain(|id, tx| match tx.try_send(payload.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                slow += 1;
                match policy {
                    SlowClientPolicy::Disconnect => {
                        warn!(client_id = *id, "client queue full; disconnecting");
                        false
                    }
                    SlowClientPolicy::Skip => {
                        debug!(client_id = *id, "client queue full; message skipped");
                        true
                    }
                }
            }
        });

        self.stats.slow_client_events += slow;
        self.stats.last_broadcast_seq = self.stats.last_broadcast_seq.max(to_seq);
        debug!(count, to_seq, clients = self.clients.len(), "batch broadcast");
    }

    fn publish(&mut self) {
        self.stats.connected_clients = self.clients.len();
        self.stats_tx.send_replace(self.stats);
    }
}
