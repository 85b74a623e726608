//! In-process job queue backed by a bounded `tokio::mpsc` channel.

use stash_core::{Job, JobQueue, JobTicket, QueueError, StashResult};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Sending half of the job queue. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct LocalJobQueue {
    tx: mpsc::Sender<JobTicket>,
}

impl LocalJobQueue {
    /// Create a queue and the receiver the worker consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobTicket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl JobQueue for LocalJobQueue {
    fn enqueue(&self, job: Job) -> StashResult<JobTicket> {
        let ticket = JobTicket::new(job);
        self.tx.try_send(ticket.clone()).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })?;

        tracing::info!(job_id = %ticket.job_id, job = job.name(), "Job enqueued");
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_core::StashError;

    #[tokio::test]
    async fn test_enqueue_delivers_ticket() {
        let (queue, mut rx) = LocalJobQueue::channel(2);
        let ticket = queue.enqueue(Job::RefreshAll).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, ticket);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_waiting() {
        let (queue, _rx) = LocalJobQueue::channel(1);
        queue.enqueue(Job::RefreshAll).unwrap();

        let result = queue.enqueue(Job::RefreshAll);
        assert_eq!(result, Err(StashError::Queue(QueueError::Full)));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (queue, rx) = LocalJobQueue::channel(1);
        drop(rx);

        let result = queue.enqueue(Job::RefreshAll);
        assert_eq!(result, Err(StashError::Queue(QueueError::Closed)));
    }
}
