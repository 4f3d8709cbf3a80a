//! Best-effort side effects of the request path.
//!
//! Ingestion audit rows and last-used touches are queued on a bounded
//! channel and written by one background worker. A full queue drops the
//! effect and counts it; a failed write is logged at WARN. Neither ever
//! fails the request that produced it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rl_admission::TouchSink;
use rl_schemas::IngestionAuditRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Audit(IngestionAuditRecord),
    Touch {
        fetcher_id: String,
        key_id: String,
        at: DateTime<Utc>,
    },
}

impl SideEffect {
    fn kind(&self) -> &'static str {
        match self {
            SideEffect::Audit(_) => "audit",
            SideEffect::Touch { .. } => "touch",
        }
    }
}

/// Where side effects land.
#[async_trait]
pub trait SideEffectStore: Send + Sync {
    async fn insert_audit(&self, record: &IngestionAuditRecord) -> Result<()>;

    /// Set `last_used_at` on the key and `last_seen_at` on the fetcher.
    async fn touch(&self, fetcher_id: &str, key_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
    dropped: Arc<AtomicU64>,
}

impl SideEffectQueue {
    /// Start the writer. It drains what is queued and exits once every
    /// queue handle has been dropped.
    pub fn spawn(store: Arc<dyn SideEffectStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(drain(store, rx));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            task,
        )
    }

    /// Never blocks. Returns `false` if the effect was dropped.
    pub fn submit(&self, effect: SideEffect) -> bool {
        match self.tx.try_send(effect) {
            Ok(()) => true,
            Err(e) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                let effect = match &e {
                    mpsc::error::TrySendError::Full(x) | mpsc::error::TrySendError::Closed(x) => x,
                };
                warn!(kind = effect.kind(), dropped_total = total, "side-effect queue unavailable; dropped");
                false
            }
        }
    }

    pub fn record_audit(&self, record: IngestionAuditRecord) -> bool {
        self.submit(SideEffect::Audit(record))
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TouchSink for SideEffectQueue {
    fn touch(&self, fetcher_id: &str, key_id: &str) {
        self.submit(SideEffect::Touch {
            fetcher_id: fetcher_id.to_string(),
            key_id: key_id.to_string(),
            at: Utc::now(),
        });
    }
}

async fn drain(store: Arc<dyn SideEffectStore>, mut rx: mpsc::Receiver<SideEffect>) {
    while let Some(effect) = rx.recv().await {
        let res = match &effect {
            SideEffect::Audit(rec) => store.insert_audit(rec).await,
            SideEffect::Touch {
                fetcher_id,
                key_id,
                at,
            } => store.touch(fetcher_id, key_id, *at).await,
        };
        if let Err(e) = res {
            warn!(kind = effect.kind(), error = %e, "side-effect write failed");
        }
    }
    debug!("side-effect writer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        audits: Mutex<Vec<IngestionAuditRecord>>,
        touches: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SideEffectStore for Recorder {
        async fn insert_audit(&self, record: &IngestionAuditRecord) -> Result<()> {
            if self.fail {
                anyhow::bail!("db down");
            }
            self.audits.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn touch(&self, fetcher_id: &str, key_id: &str, _at: DateTime<Utc>) -> Result<()> {
            if self.fail {
                anyhow::bail!("db down");
            }
            self.touches
                .lock()
                .unwrap()
                .push((fetcher_id.into(), key_id.into()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn effects_are_written_in_order_and_drained_on_close() {
        let store = Arc::new(Recorder::default());
        let (q, task) = SideEffectQueue::spawn(store.clone(), 8);
        q.touch("f", "k");
        assert!(q.record_audit(IngestionAuditRecord {
            endpoint: "bulk_ingest".into(),
            items_submitted: 3,
            ..Default::default()
        }));
        drop(q);
        task.await.unwrap();

        assert_eq!(store.touches.lock().unwrap().as_slice(), &[("f".to_string(), "k".to_string())]);
        assert_eq!(store.audits.lock().unwrap()[0].items_submitted, 3);
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let store = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (q, task) = SideEffectQueue::spawn(store, 8);
        q.touch("f", "k");
        assert!(q.record_audit(IngestionAuditRecord::default()));
        drop(q);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_queue_counts_drops() {
        let store = Arc::new(Recorder::default());
        let (q, task) = SideEffectQueue::spawn(store, 1);
        task.abort();
        let _ = task.await;
        assert!(!q.record_audit(IngestionAuditRecord::default()));
        q.touch("f", "k");
        assert_eq!(q.dropped(), 2);
    }
}
