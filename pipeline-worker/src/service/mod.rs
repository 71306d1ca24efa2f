//! Lifecycle controller of one pipeline.
//!
//! [`WorkerService`] owns the in-memory copy of the pipeline definition and the
//! [`Worker`] running its tasks. Four loops drive it:
//!
//! - **poll**: fetches the definition and signals a reload when it changed
//! - **reload**: applies the latest definition (start, update, pause, resume)
//! - **recover**: reconciles memory with the store and restarts failed pipelines
//! - **failure listener**: stops the worker of a failed task and persists `error`
//!
//! Every transition runs under one async mutex over [`ServiceState`], so the
//! reload dispatcher and the failure listener never stop or replace the worker
//! concurrently. Tasks never take that lock; they report failures through a
//! bounded channel.

mod transitions;

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::future::join_all;
use pipeline_kafka::MqAccess;
use pipeline_worker_repository::{IndexBaseService, PipelineMgmtAccess, SearchIndexProvider};
use pipeline_worker_shared::PipelineDefinition;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::WorkerSettings;
use crate::errors::ControllerError;
use crate::worker::{TaskDependencies, Worker, WorkerError};

/// Capacity of the failure channel shared by every task of the service.
const ERROR_CHANNEL_CAPACITY: usize = 100;

/// Collaborators of the lifecycle controller.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub pipeline_mgmt: Arc<dyn PipelineMgmtAccess>,
    pub index_bases: Arc<dyn IndexBaseService>,
    pub mq: Arc<dyn MqAccess>,
    pub search: Arc<dyn SearchIndexProvider>,
}

/// Mutable state guarded by the service lock.
#[derive(Default)]
struct ServiceState {
    /// Definition the worker currently follows.
    pipeline: Option<PipelineDefinition>,
    /// Latest definition seen by the poll loop, applied by the next reload.
    polled: Option<PipelineDefinition>,
    worker: Option<Worker>,
    next_generation: u64,
    /// Set once the service is stopping; no transition runs afterwards.
    stopped: bool,
}

struct ServiceInner {
    pipeline_id: String,
    settings: WorkerSettings,
    pipeline_mgmt: Arc<dyn PipelineMgmtAccess>,
    index_bases: Arc<dyn IndexBaseService>,
    task_deps: TaskDependencies,
    state: Mutex<ServiceState>,
    reload_tx: mpsc::Sender<()>,
    error_tx: mpsc::Sender<WorkerError>,
    shutdown_tx: broadcast::Sender<()>,
}

type Receivers = (mpsc::Receiver<()>, mpsc::Receiver<WorkerError>);

/// Lifecycle controller of one pipeline.
pub struct WorkerService {
    inner: Arc<ServiceInner>,
    receivers: StdMutex<Option<Receivers>>,
    loops: StdMutex<Vec<JoinHandle<()>>>,
}

impl WorkerService {
    pub fn new(settings: WorkerSettings, deps: ServiceDependencies) -> Self {
        // One slot: signals raised while a reload is pending collapse into it
        let (reload_tx, reload_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let inner = ServiceInner {
            pipeline_id: settings.pipeline_id.clone(),
            settings,
            pipeline_mgmt: deps.pipeline_mgmt,
            index_bases: deps.index_bases,
            task_deps: TaskDependencies {
                mq: deps.mq,
                search: deps.search,
            },
            state: Mutex::new(ServiceState::default()),
            reload_tx,
            error_tx,
            shutdown_tx,
        };

        Self {
            inner: Arc::new(inner),
            receivers: StdMutex::new(Some((reload_rx, error_rx))),
            loops: StdMutex::new(Vec::new()),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.inner.pipeline_id
    }

    /// Spawn the poll, reload, recover and failure listener loops.
    pub fn start(&self) {
        let receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((reload_rx, error_rx)) = receivers else {
            warn!(pipeline_id = %self.inner.pipeline_id, "Worker service already started");
            return;
        };

        info!(
            pipeline_id = %self.inner.pipeline_id,
            config_poll_interval_ms = self.inner.settings.config_poll_interval.as_millis() as u64,
            watch_workers_interval_secs = self.inner.settings.watch_workers_interval.as_secs(),
            "Starting worker service"
        );

        // Subscribed before spawning; a stop issued right away must reach every loop
        let shutdown = &self.inner.shutdown_tx;
        let handles = vec![
            tokio::spawn(poll_loop(Arc::clone(&self.inner), shutdown.subscribe())),
            tokio::spawn(reload_loop(
                Arc::clone(&self.inner),
                reload_rx,
                shutdown.subscribe(),
            )),
            tokio::spawn(recover_loop(Arc::clone(&self.inner), shutdown.subscribe())),
            tokio::spawn(failure_loop(
                Arc::clone(&self.inner),
                error_rx,
                shutdown.subscribe(),
            )),
        ];
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
    }

    /// Pause the worker in memory, then end every loop.
    pub async fn stop(&self) {
        info!(pipeline_id = %self.inner.pipeline_id, "Stopping worker service");
        {
            let mut state = self.inner.state.lock().await;
            state.stopped = true;
            if let Err(e) = self.inner.pause_locked(&mut state).await {
                info!(pipeline_id = %self.inner.pipeline_id, error = %e, "Pipeline not paused on stop");
            }
            if let Some(mut worker) = state.worker.take() {
                worker.stop_tasks().await;
            }
        }

        let _ = self.inner.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker service loop ended abnormally");
            }
        }
        info!(pipeline_id = %self.inner.pipeline_id, "Worker service stopped");
    }

    /// Fetch the definition once. Returns true when a reload was signalled.
    pub async fn poll_config(&self) -> Result<bool, ControllerError> {
        self.inner.poll_config().await
    }

    /// Apply the latest polled definition.
    pub async fn reload(&self) -> Result<(), ControllerError> {
        self.inner.reload().await
    }

    /// Pause the pipeline. Returns false when it was already paused.
    pub async fn pause(&self) -> Result<bool, ControllerError> {
        let mut state = self.inner.state.lock().await;
        self.inner.pause_locked(&mut state).await
    }

    /// Run one reconciliation against the store.
    pub async fn recover(&self) -> Result<(), ControllerError> {
        self.inner.recover().await
    }

    /// Handle a task failure as the failure listener does.
    pub async fn handle_failure(&self, failure: WorkerError) {
        self.inner.handle_failure(failure).await
    }

    /// In-memory copy of the pipeline definition.
    pub async fn pipeline(&self) -> Option<PipelineDefinition> {
        self.inner.state.lock().await.pipeline.clone()
    }

    /// Generation of the current worker, if one is running.
    pub async fn worker_generation(&self) -> Option<u64> {
        self.inner
            .state
            .lock()
            .await
            .worker
            .as_ref()
            .map(Worker::generation)
    }
}

async fn poll_loop(inner: Arc<ServiceInner>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        if let Err(e) = inner.poll_config().await {
            warn!(pipeline_id = %inner.pipeline_id, error = %e, "Failed to poll pipeline configuration");
        }
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = sleep(inner.settings.config_poll_interval) => {}
        }
    }
    info!(pipeline_id = %inner.pipeline_id, "Configuration poll loop stopped");
}

async fn reload_loop(
    inner: Arc<ServiceInner>,
    mut reload_rx: mpsc::Receiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            signal = reload_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                if let Err(e) = inner.reload().await {
                    error!(pipeline_id = %inner.pipeline_id, error = %e, "Failed to reload worker");
                }
            }
        }
    }
    info!(pipeline_id = %inner.pipeline_id, "Reload loop stopped");
}

async fn recover_loop(inner: Arc<ServiceInner>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        if let Err(e) = inner.recover().await {
            warn!(pipeline_id = %inner.pipeline_id, error = %e, "Failed to recover worker");
        }
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = sleep(inner.settings.watch_workers_interval) => {}
        }
    }
    info!(pipeline_id = %inner.pipeline_id, "Recover loop stopped");
}

async fn failure_loop(
    inner: Arc<ServiceInner>,
    mut error_rx: mpsc::Receiver<WorkerError>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            failure = error_rx.recv() => match failure {
                Some(failure) => inner.handle_failure(failure).await,
                None => {
                    error!(pipeline_id = %inner.pipeline_id, "Error channel closed");
                    break;
                }
            }
        }
    }
    info!(pipeline_id = %inner.pipeline_id, "Failure listener stopped");
}
