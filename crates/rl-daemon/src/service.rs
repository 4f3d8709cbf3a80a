//! Service lifecycle: wires storage, hub, detector and side-effect writer.
//!
//! `Service::start` returns only after the cursor is initialized, so a
//! running service always knows where its feed resumes. `ServiceHandle::stop`
//! flips one shutdown watch that every background loop selects on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use rl_admission::{Authenticator, FetcherDirectory, IdempotencyIndex, IngestWriter, KeyEnvironment, QuotaLedger};
use rl_audit::{SideEffectQueue, SideEffectStore};
use rl_broadcast::{
    BroadcastHub, ChangeDetector, CheckpointStore, CursorReader, DetectorConfig, HubConfig, HubHandle, ReportReader,
    ReportSource,
};
use rl_config::ListenerConfig;
use rl_db::PgStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::routes;
use crate::state::{AppState, BuildInfo};

/// How long `stop` waits for queued audit rows and touches to flush.
const SIDE_EFFECT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Every storage seam the service depends on.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn FetcherDirectory>,
    pub quota: Arc<dyn QuotaLedger>,
    pub index: Arc<dyn IdempotencyIndex>,
    pub writer: Arc<dyn IngestWriter>,
    pub reports: Arc<dyn ReportSource>,
    pub reader: Arc<dyn ReportReader>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub side_effects: Arc<dyn SideEffectStore>,
}

impl Backends {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            directory: store.clone(),
            quota: store.clone(),
            index: store.clone(),
            writer: store.clone(),
            reports: store.clone(),
            reader: store.clone(),
            checkpoints: store.clone(),
            side_effects: store,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct Service;

impl Service {
    pub async fn start(cfg: &ListenerConfig, backends: Backends) -> Result<ServiceHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (side_effects, side_effect_task) = SideEffectQueue::spawn(
            backends.side_effects.clone(),
            cfg.admission.side_effect_queue_capacity,
        );

        let (hub, hub_task) = BroadcastHub::spawn(
            HubConfig {
                client_queue_capacity: cfg.broadcast.client_queue_capacity,
                command_queue_capacity: cfg.broadcast.hub_queue_capacity,
                slow_client_policy: cfg.broadcast.slow_client_policy,
            },
            shutdown_rx.clone(),
        );

        let (mut detector, cursor) = ChangeDetector::new(
            DetectorConfig {
                service_name: cfg.service.name.clone(),
                interval: cfg.broadcast.interval,
                batch_limit: cfg.broadcast.batch_limit,
            },
            backends.reports.clone(),
            backends.checkpoints.clone(),
            hub.clone(),
        );

        let start_seq = match detector.initialize().await {
            Ok(seq) => seq,
            Err(e) => {
                let _ = shutdown_tx.send(true);
                let _ = hub_task.await;
                return Err(e.context("change detector initialization failed"));
            }
        };
        let detector_task = detector.spawn(shutdown_rx);

        let environment = KeyEnvironment::parse(&cfg.admission.key_environment);
        let authenticator = Authenticator::new(
            backends.directory.clone(),
            Arc::new(side_effects.clone()),
            environment,
            cfg.admission.hash_timeout,
        );

        let state = Arc::new(AppState {
            build: BuildInfo::current(),
            service_name: cfg.service.name.clone(),
            authenticator,
            quota: backends.quota.clone(),
            index: backends.index.clone(),
            writer: backends.writer.clone(),
            reader: backends.reader.clone(),
            feed: backends.reports.clone(),
            side_effects,
            hub,
            cursor,
            ingest: cfg.ingest.clone(),
        });

        info!(
            service = %cfg.service.name,
            start_seq,
            key_environment = ?environment,
            "report listener started"
        );

        Ok(ServiceHandle {
            state,
            shutdown: Arc::new(shutdown_tx),
            tasks: vec![hub_task, detector_task],
            side_effect_task,
        })
    }
}

// ---------------------------------------------------------------------------
// ServiceHandle
// ---------------------------------------------------------------------------

pub struct ServiceHandle {
    state: Arc<AppState>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    side_effect_task: JoinHandle<()>,
}

/// Cloneable trigger for the service-wide shutdown signal.
#[derive(Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    /// Idempotent.
    pub fn fire(&self) {
        let _ = self.0.send(true);
    }
}

impl ServiceHandle {
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    pub fn cursor(&self) -> &CursorReader {
        &self.state.cursor
    }

    /// Bare router without middleware; `main.rs` layers tracing and CORS.
    pub fn router(&self) -> Router {
        routes::build_router(self.state())
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(Arc::clone(&self.shutdown))
    }

    /// Stop the hub and detector, then give the side-effect writer a bounded
    /// window to flush. Routers still holding the state keep the writer
    /// alive; in that case the wait times out and queued effects are lost.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        drop(self.state);
        match tokio::time::timeout(SIDE_EFFECT_DRAIN_TIMEOUT, self.side_effect_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "side-effect writer ended abnormally"),
            Err(_) => warn!("side-effect writer still busy at shutdown"),
        }
        info!("report listener stopped");
    }
}
