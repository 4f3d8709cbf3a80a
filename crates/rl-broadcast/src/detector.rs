//! Poll loop that turns newly visible rows into ordered batches.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rl_schemas::ReportBatch;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cursor::{CursorReader, SequenceCursor};
use crate::hub::HubHandle;
use crate::source::{CheckpointStore, ReportSource};

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Row key in the checkpoint store.
    pub service_name: String,
    pub interval: Duration,
    pub batch_limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing new.
    Idle,
    Broadcast { count: usize, to_seq: i64 },
    /// Source query or hub hand-off failed; the cursor did not move.
    Failed,
}

pub struct ChangeDetector {
    config: DetectorConfig,
    source: Arc<dyn ReportSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    hub: HubHandle,
    cursor: SequenceCursor,
}

impl ChangeDetector {
    pub fn new(
        config: DetectorConfig,
        source: Arc<dyn ReportSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        hub: HubHandle,
    ) -> (Self, CursorReader) {
        let (cursor, reader) = SequenceCursor::new();
        (
            Self {
                config,
                source,
                checkpoints,
                hub,
                cursor,
            },
            reader,
        )
    }

    /// Resolve the starting seq.
    ///
    /// A stored checkpoint wins. Without one the detector starts at the
    /// current maximum seq (history is not replayed) and persists it right
    /// away. Failing to read either is a startup error.
    pub async fn initialize(&mut self) -> Result<i64> {
        let name = self.config.service_name.clone();
        let stored = self
            .checkpoints
            .load(&name)
            .await
            .with_context(|| format!("load checkpoint for service '{name}'"))?;

        let start = match stored {
            Some(seq) => {
                info!(service = %name, seq, "resuming from checkpoint");
                seq
            }
            None => {
                let latest = self
                    .source
                    .latest_seq()
                    .await
                    .context("read latest report seq")?;
                info!(service = %name, seq = latest, "no checkpoint; starting at latest seq");
                if let Err(e) = self.checkpoints.store(&name, latest).await {
                    warn!(service = %name, error = %e, "failed to persist initial checkpoint");
                }
                latest
            }
        };
        self.cursor.initialize(start);
        Ok(start)
    }

    /// One poll. The cursor moves only after the batch reached the hub.
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(after) = self.cursor.current() else {
            error!("change detector ticked before initialization");
            return TickOutcome::Failed;
        };

        let rows = match self
            .source
            .visible_since(after, self.config.batch_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(after_seq = after, error = %e, "report poll failed; retrying next tick");
                return TickOutcome::Failed;
            }
        };

        let Some(batch) = ReportBatch::from_ordered(rows) else {
            return TickOutcome::Idle;
        };
        let (count, to_seq) = (batch.count, batch.to_seq);

        if let Err(e) = self.hub.broadcast(batch).await {
            error!(to_seq, error = %e, "hub rejected batch");
            return TickOutcome::Failed;
        }

        self.cursor.advance(to_seq);
        if let Err(e) = self.checkpoints.store(&self.config.service_name, to_seq).await {
            warn!(seq = to_seq, error = %e, "checkpoint write failed; in-memory cursor kept");
        }
        debug!(count, to_seq, "broadcast new reports");
        TickOutcome::Broadcast { count, to_seq }
    }

    /// Tick until `shutdown` flips to `true`. A tick already running when
    /// shutdown arrives finishes first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_limit = self.config.batch_limit,
            "change detector started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(last_processed_seq = ?self.cursor.current(), "change detector stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
