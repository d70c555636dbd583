use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ConsumerConfig;
use crate::error::{JobRunnerError, Result};
use crate::job::JobContext;
use crate::shutdown::StopOutcome;
use crate::worker::queue::{job_queue, JobReceiver, JobSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Running,
    /// Queue closed, workers finishing what is left.
    Draining,
    Stopped,
}

/// Outcome counters shared by every worker of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.timed_out + self.cancelled
    }
}

impl WorkerStats {
    fn record(&self, worker: usize, outcome: &Result<()>) {
        match outcome {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker, "Job completed");
            }
            Err(JobRunnerError::DeadlineExceeded) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker, "Job exceeded its deadline");
            }
            Err(JobRunnerError::Cancelled) => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker, "Job cancelled");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker, error = %e, "Job failed");
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-size worker pool draining the job queue.
///
/// The pool owns the queue: [`JobConsumer::start`] allocates it with one slot
/// per worker and hands out the send half, [`JobConsumer::stop`] closes it.
/// Every job runs under its own [`JobContext`] bounded by the configured job
/// timeout. Failed jobs are counted and logged, never retried.
pub struct JobConsumer {
    config: ConsumerConfig,
    state: ConsumerState,
    sender: Option<JobSender>,
    receiver: Option<JobReceiver>,
    tracker: TaskTracker,
    force: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl JobConsumer {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            state: ConsumerState::Idle,
            sender: None,
            receiver: None,
            tracker: TaskTracker::new(),
            force: CancellationToken::new(),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Allocate the queue and spawn the workers.
    ///
    /// Cancelling `parent` cancels every job context derived from it.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<JobSender> {
        if self.state != ConsumerState::Idle {
            return Err(JobRunnerError::AlreadyStarted("JobConsumer"));
        }

        let workers = self.config.resolved_workers();
        let (sender, receiver) = job_queue(workers);
        self.force = parent.child_token();

        for id in 0..workers {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                force: self.force.clone(),
                job_timeout: self.config.job_timeout,
                stats: self.stats.clone(),
            };
            self.tracker.spawn(worker.run());
        }
        self.tracker.close();

        tracing::info!(
            workers,
            job_timeout_ms = self.config.job_timeout.as_millis() as u64,
            "JobConsumer started"
        );

        self.sender = Some(sender.clone());
        self.receiver = Some(receiver);
        self.state = ConsumerState::Running;
        Ok(sender)
    }

    /// Close the queue and wait up to `timeout` for the workers to drain it.
    ///
    /// When the timeout elapses first, every in-flight and still-queued job is
    /// cancelled and control returns without waiting further.
    pub async fn stop(&mut self, timeout: Duration) -> StopOutcome {
        match self.state {
            ConsumerState::Idle => {
                self.state = ConsumerState::Stopped;
                return StopOutcome::Clean;
            }
            ConsumerState::Stopped => return StopOutcome::Clean,
            ConsumerState::Running | ConsumerState::Draining => {}
        }

        tracing::info!("JobConsumer stopping...");
        self.state = ConsumerState::Draining;
        self.sender.take();
        if let Some(receiver) = &self.receiver {
            receiver.close();
        }

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("JobConsumer stopped");
                self.state = ConsumerState::Stopped;
                StopOutcome::Clean
            }
            Err(_) => {
                tracing::warn!(
                    live_workers = self.tracker.len(),
                    "JobConsumer failed to stop before the deadline, cancelling in-flight jobs"
                );
                self.force.cancel();
                StopOutcome::TimedOut
            }
        }
    }

    pub fn state(&self) -> ConsumerState {
        if self.state == ConsumerState::Draining && self.tracker.is_empty() {
            ConsumerState::Stopped
        } else {
            self.state
        }
    }

    /// Number of workers this pool spawns.
    pub fn worker_count(&self) -> usize {
        self.config.resolved_workers()
    }

    /// Number of worker tasks that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }
}

struct Worker {
    id: usize,
    receiver: JobReceiver,
    force: CancellationToken,
    job_timeout: Duration,
    stats: Arc<WorkerStats>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        while let Some(job) = self.receiver.recv().await {
            let ctx = JobContext::new(self.force.child_token(), self.job_timeout);
            let outcome = tokio::select! {
                biased;
                result = job.execute(&ctx) => result,
                reason = ctx.done() => {
                    ctx.cancel();
                    Err(reason)
                }
            };
            self.stats.record(self.id, &outcome);
        }

        tracing::info!(worker = self.id, "Worker stopping");
    }
}
