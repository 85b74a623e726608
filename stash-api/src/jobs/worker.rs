//! Job Worker Background Task
//!
//! Consumes tickets from the job queue one at a time until the queue closes
//! or the shutdown signal fires. A shutdown during a running refresh stops
//! that refresh at its next suspension point.

use stash_core::{Job, JobTicket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::services::CacheRefresher;
use crate::telemetry::with_metrics;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the worker's lifetime.
#[derive(Debug, Default)]
pub struct JobWorkerMetrics {
    /// Jobs that ran to completion
    pub completed: AtomicU64,

    /// Jobs that returned an error
    pub failed: AtomicU64,

    /// Jobs interrupted by shutdown
    pub cancelled: AtomicU64,
}

impl JobWorkerMetrics {
    pub fn snapshot(&self) -> JobWorkerSnapshot {
        JobWorkerSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of worker metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobWorkerSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

enum RunResult {
    Finished,
    Shutdown,
}

/// Run queued jobs until shutdown.
///
/// ```ignore
/// let (queue, rx) = LocalJobQueue::channel(16);
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let worker = tokio::spawn(job_worker_task(refresher, rx, shutdown_rx));
///
/// // On shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = worker.await?;
/// ```
pub async fn job_worker_task(
    refresher: Arc<CacheRefresher>,
    mut jobs: mpsc::Receiver<JobTicket>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JobWorkerMetrics> {
    let metrics = Arc::new(JobWorkerMetrics::default());
    tracing::info!("Job worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            ticket = jobs.recv() => {
                let Some(ticket) = ticket else {
                    tracing::info!("Job queue closed");
                    break;
                };
                if let RunResult::Shutdown = run(&refresher, ticket, &metrics, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        completed = snapshot.completed,
        failed = snapshot.failed,
        cancelled = snapshot.cancelled,
        "Job worker stopped"
    );

    metrics
}

async fn run(
    refresher: &CacheRefresher,
    ticket: JobTicket,
    metrics: &JobWorkerMetrics,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> RunResult {
    let span = tracing::info_span!("job", job_id = %ticket.job_id, job = ticket.job.name());

    async move {
        match ticket.job {
            Job::RefreshAll => {
                tokio::select! {
                    result = refresher.refresh_all() => {
                        match result {
                            Ok(report) => {
                                metrics.completed.fetch_add(1, Ordering::Relaxed);
                                with_metrics(|m| m.record_refresh_job("completed"));
                                tracing::info!(populated = report.populated, failed = report.failed, "Job completed");
                            }
                            Err(e) => {
                                metrics.failed.fetch_add(1, Ordering::Relaxed);
                                with_metrics(|m| m.record_refresh_job("failed"));
                                tracing::error!(error = %e, "Job failed");
                            }
                        }
                        RunResult::Finished
                    }
                    _ = wait_for_shutdown(shutdown_rx) => {
                        metrics.cancelled.fetch_add(1, Ordering::Relaxed);
                        with_metrics(|m| m.record_refresh_job("cancelled"));
                        tracing::warn!("Job cancelled by shutdown");
                        RunResult::Shutdown
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
