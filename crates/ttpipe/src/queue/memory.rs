//! In-process job queue: an unbounded channel drained by a dispatcher that
//! runs at most `concurrency` jobs at once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::queue::{JobHandler, JobQueue, PipelineJob};

#[derive(Default)]
struct QueueStats {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Decrements the in-flight counter even if the job panics.
struct InFlightGuard(Arc<QueueStats>);

impl InFlightGuard {
    fn enter(stats: &Arc<QueueStats>) -> Self {
        stats.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(stats))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

pub struct MemoryJobQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<PipelineJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<QueueStats>,
    closed: AtomicBool,
}

impl MemoryJobQueue {
    /// Spawns the dispatcher on the current tokio runtime.
    pub fn start(config: &QueueConfig, handler: Arc<dyn JobHandler>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let concurrency = config.concurrency.max(1);

        let dispatcher = tokio::spawn(dispatch(
            receiver,
            handler,
            concurrency,
            config.job_timeout(),
            Arc::clone(&stats),
        ));

        info!(
            "Job queue started (concurrency {}, timeout {}ms)",
            concurrency, config.timeout_ms
        );

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            stats,
            closed: AtomicBool::new(false),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            in_flight: self.in_flight(),
            completed: self.stats.completed.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            timed_out: self.stats.timed_out.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting jobs, then waits for queued and running jobs to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down job queue...");
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!("Job dispatcher ended abnormally: {}", e);
            }
        }
        info!("Job queue drained");
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: PipelineJob) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let sender = self.sender.lock().map_err(|_| QueueError::Closed)?;
        let sender = sender.as_ref().ok_or(QueueError::Closed)?;
        debug!("Enqueued job for document {}", job.document_id);
        sender.send(job).map_err(|_| QueueError::Closed)
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<PipelineJob>,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
    timeout: Duration,
    stats: Arc<QueueStats>,
) {
    let permits = Arc::new(Semaphore::new(concurrency));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let handler = Arc::clone(&handler);
        let stats = Arc::clone(&stats);

        tokio::spawn(async move {
            let _permit = permit;
            let _in_flight = InFlightGuard::enter(&stats);
            run_job(handler.as_ref(), &job, timeout, &stats).await;
        });
    }

    // Channel closed: wait for running jobs to release their permits
    let _ = permits.acquire_many(concurrency as u32).await;
}

async fn run_job(handler: &dyn JobHandler, job: &PipelineJob, timeout: Duration, stats: &QueueStats) {
    match tokio::time::timeout(timeout, handler.handle(job)).await {
        Ok(Ok(())) => {
            stats.completed.fetch_add(1, Ordering::SeqCst);
            debug!("Job for document {} completed", job.document_id);
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            warn!("{}", e);
        }
        Err(_) => {
            stats.timed_out.fetch_add(1, Ordering::SeqCst);
            warn!(
                "Job for document {} exceeded {}ms and was abandoned",
                job.document_id,
                timeout.as_millis()
            );
            handler.timed_out(job, timeout).await;
        }
    }
}
