use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{JobRunnerError, Result};
use crate::job::Job;

/// Create a bounded job queue holding at most `capacity` pending jobs.
pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = JobSender { tx };
    let receiver = JobReceiver {
        rx: Arc::new(Mutex::new(rx)),
        closed: CancellationToken::new(),
    };
    (sender, receiver)
}

/// Send half of the job queue. Cheap to clone; cannot close the queue.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Box<dyn Job>>,
}

impl JobSender {
    /// Enqueue a job, waiting for a free slot while the queue is full.
    pub async fn send(&self, job: Box<dyn Job>) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| JobRunnerError::QueueClosed)
    }

    /// Number of jobs waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for JobSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSender")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receive half of the job queue, shared by every worker of a pool.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Box<dyn Job>>>>,
    closed: CancellationToken,
}

impl JobReceiver {
    /// Take the next job. Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Box<dyn Job>> {
        let mut rx = self.rx.lock().await;
        if !self.closed.is_cancelled() {
            tokio::select! {
                biased;
                job = rx.recv() => return job,
                _ = self.closed.cancelled() => {}
            }
        }
        // Buffered jobs are still handed out after close.
        rx.close();
        rx.recv().await
    }

    /// Reject further sends. Jobs already queued remain receivable.
    pub fn close(&self) {
        self.closed.cancel();
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
