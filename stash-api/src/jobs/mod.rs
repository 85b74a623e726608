//! Background Jobs for the Stash API
//!
//! - `queue`: bounded in-process queue implementing `JobQueue`
//! - `worker`: task that runs queued jobs until shutdown
//!
//! # Usage
//!
//! ```ignore
//! use stash_api::jobs::{job_worker_task, LocalJobQueue};
//! use tokio::sync::watch;
//!
//! let (queue, rx) = LocalJobQueue::channel(16);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(job_worker_task(refresher, rx, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod queue;
pub mod worker;

pub use queue::LocalJobQueue;
pub use worker::{job_worker_task, JobWorkerMetrics, JobWorkerSnapshot};
