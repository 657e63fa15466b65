//! Derivative queue: worker pool, submission and per-job completion tickets.
//!
//! Shutdown: [`DerivativeQueue::shutdown`] makes the queue refuse new jobs, runs every job
//! already accepted (queued or running) to completion, and returns once the pool is idle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portrait_core::DerivativeConfig;
use portrait_processing::{DerivativeGenerator, DerivativeReport};
use portrait_storage::DerivativeRoots;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Derivative queue is shut down")]
    ShutDown,

    #[error("Derivative job for {0} was dropped before it ran")]
    Cancelled(Uuid),
}

#[derive(Debug, Clone)]
pub struct DerivativeQueueConfig {
    pub max_workers: usize,
    /// Jobs that may wait for a worker before `submit` applies backpressure.
    pub capacity: usize,
}

impl Default for DerivativeQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            capacity: 256,
        }
    }
}

impl From<&DerivativeConfig> for DerivativeQueueConfig {
    fn from(config: &DerivativeConfig) -> Self {
        Self {
            max_workers: config.workers.max(1),
            ..Self::default()
        }
    }
}

/// Regenerate the derivatives of one asset from its finalized original.
#[derive(Debug, Clone)]
pub struct DerivativeJob {
    pub asset_id: Uuid,
    pub original: PathBuf,
    pub mimetype: String,
}

/// Completion signal for a submitted job.
#[derive(Debug)]
pub struct DerivativeTicket {
    asset_id: Uuid,
    rx: oneshot::Receiver<DerivativeReport>,
}

impl DerivativeTicket {
    pub fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<DerivativeReport, WorkerError> {
        self.rx.await.map_err(|_| WorkerError::Cancelled(self.asset_id))
    }
}

struct QueuedJob {
    job: DerivativeJob,
    done: oneshot::Sender<DerivativeReport>,
}

#[derive(Clone)]
pub struct DerivativeQueue {
    job_tx: mpsc::Sender<QueuedJob>,
    shutdown_tx: mpsc::Sender<oneshot::Sender<()>>,
    closed: Arc<AtomicBool>,
    config: DerivativeQueueConfig,
}

impl DerivativeQueue {
    /// Create the queue and spawn its worker pool on the current runtime.
    pub fn new(
        generator: DerivativeGenerator,
        roots: DerivativeRoots,
        config: DerivativeQueueConfig,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let pool_config = config.clone();
        tokio::spawn(async move {
            Self::worker_pool(generator, roots, pool_config, job_rx, shutdown_rx).await;
        });

        Self {
            job_tx,
            shutdown_tx,
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn config(&self) -> &DerivativeQueueConfig {
        &self.config
    }

    /// Hand a job to the pool. The returned ticket may be awaited or dropped.
    #[tracing::instrument(skip(self, job), fields(asset_id = %job.asset_id))]
    pub async fn submit(&self, job: DerivativeJob) -> Result<DerivativeTicket, WorkerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkerError::ShutDown);
        }

        let asset_id = job.asset_id;
        let (done, rx) = oneshot::channel();
        self.job_tx
            .send(QueuedJob { job, done })
            .await
            .map_err(|_| WorkerError::ShutDown)?;

        tracing::debug!(asset_id = %asset_id, "Derivative job queued");
        Ok(DerivativeTicket { asset_id, rx })
    }

    /// Stop intake and wait until every accepted job has finished.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating derivative queue shutdown");
        self.closed.store(true, Ordering::Release);

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.shutdown_tx.send(ack_tx).await.is_err() {
            // Pool already gone.
            return;
        }
        if ack_rx.await.is_err() {
            tracing::debug!("Derivative pool stopped before acknowledging shutdown");
        }
    }

    async fn worker_pool(
        generator: DerivativeGenerator,
        roots: DerivativeRoots,
        config: DerivativeQueueConfig,
        mut job_rx: mpsc::Receiver<QueuedJob>,
        mut shutdown_rx: mpsc::Receiver<oneshot::Sender<()>>,
    ) {
        tracing::info!(max_workers = config.max_workers, "Derivative worker pool started");
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let mut running = JoinSet::new();

        let ack = loop {
            tokio::select! {
                ack = shutdown_rx.recv() => break ack,
                queued = job_rx.recv() => {
                    let Some(queued) = queued else {
                        break None;
                    };
                    Self::dispatch(&generator, &roots, &semaphore, &mut running, queued).await;
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join(joined);
                }
            }
        };

        // No new sends succeed past this point; whatever is buffered still runs.
        job_rx.close();
        let mut drained = 0usize;
        while let Some(queued) = job_rx.recv().await {
            Self::dispatch(&generator, &roots, &semaphore, &mut running, queued).await;
            drained += 1;
        }
        tracing::info!(
            drained,
            running = running.len(),
            "Derivative worker pool shutting down, waiting for jobs"
        );

        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }

        tracing::info!("Derivative worker pool stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    async fn dispatch(
        generator: &DerivativeGenerator,
        roots: &DerivativeRoots,
        semaphore: &Arc<Semaphore>,
        running: &mut JoinSet<()>,
        queued: QueuedJob,
    ) {
        // The semaphore is never closed.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return;
        };

        let generator = generator.clone();
        let roots = roots.clone();
        running.spawn(async move {
            let _permit = permit;
            let QueuedJob { job, done } = queued;
            let report = generator
                .generate(&job.original, &roots, job.asset_id, &job.mimetype)
                .await;
            if done.send(report).is_err() {
                tracing::trace!(asset_id = %job.asset_id, "Derivative ticket dropped");
            }
        });
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Derivative job task failed");
    }
}
