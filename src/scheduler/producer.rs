use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::ProducerConfig;
use crate::error::{JobRunnerError, Result};
use crate::job::JobSource;
use crate::scheduler::cadence::Cadence;
use crate::shutdown::StopOutcome;
use crate::worker::JobSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Polls a [`JobSource`] on a wall-clock aligned cadence and feeds the queue.
///
/// A producer runs once: after [`JobProducer::stop`] a fresh instance is
/// needed.
pub struct JobProducer {
    source: Arc<dyn JobSource>,
    queue: Option<JobSender>,
    config: ProducerConfig,
    state: ProducerState,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl JobProducer {
    pub fn new(source: Arc<dyn JobSource>, queue: JobSender, config: ProducerConfig) -> Self {
        Self {
            source,
            queue: Some(queue),
            config,
            state: ProducerState::Idle,
            stop: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawn the scheduling loop and return immediately.
    ///
    /// The loop polls once right away, sleeps until the next interval
    /// boundary, polls again, then polls once per interval until stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ProducerState::Idle {
            return Err(JobRunnerError::AlreadyStarted("JobProducer"));
        }
        let queue = self
            .queue
            .take()
            .ok_or_else(|| JobRunnerError::Internal("producer has no queue".to_string()))?;

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_jobs_per_poll = self.config.max_jobs_per_poll,
            "JobProducer starting..."
        );

        let scheduling = SchedulingLoop {
            source: self.source.clone(),
            queue,
            cadence: Cadence::new(self.config.poll_interval),
            max_jobs_per_poll: self.config.max_jobs_per_poll,
            stop: self.stop.clone(),
        };
        self.handle = Some(tokio::spawn(scheduling.run()));
        self.state = ProducerState::Running;
        Ok(())
    }

    /// Signal the loop to exit and wait up to `timeout` for it to acknowledge.
    pub async fn stop(&mut self, timeout: Duration) -> StopOutcome {
        match self.state {
            ProducerState::Idle => {
                self.queue.take();
                self.state = ProducerState::Stopped;
                return StopOutcome::Clean;
            }
            ProducerState::Stopped => return StopOutcome::Clean,
            ProducerState::Running | ProducerState::Stopping => {}
        }

        tracing::info!("JobProducer stopping...");
        self.state = ProducerState::Stopping;
        self.stop.cancel();

        let Some(handle) = self.handle.as_mut() else {
            self.state = ProducerState::Stopped;
            return StopOutcome::Clean;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "JobProducer loop ended abnormally");
                } else {
                    tracing::info!("JobProducer stopped");
                }
                self.handle = None;
                self.state = ProducerState::Stopped;
                StopOutcome::Clean
            }
            Err(_) => {
                tracing::warn!("JobProducer stopped while pushing new jobs");
                StopOutcome::TimedOut
            }
        }
    }

    pub fn state(&self) -> ProducerState {
        match (&self.state, &self.handle) {
            (ProducerState::Stopping, Some(handle)) if handle.is_finished() => {
                ProducerState::Stopped
            }
            (state, _) => *state,
        }
    }
}

struct SchedulingLoop {
    source: Arc<dyn JobSource>,
    queue: JobSender,
    cadence: Cadence,
    max_jobs_per_poll: usize,
    stop: CancellationToken,
}

impl SchedulingLoop {
    async fn run(self) {
        // Pick up anything that came due while nobody was polling.
        if self.poll_and_enqueue().await.is_break() {
            return;
        }

        let wait = self.cadence.until_next_boundary(Utc::now());
        tracing::info!(wait_secs = wait.as_secs_f64(), "Sleeping until the next poll boundary");
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                tracing::info!("JobProducer received quit signal");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let period = self.cadence.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.poll_and_enqueue().await.is_break() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::info!("JobProducer received quit signal");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::debug!("JobProducer waking to poll for jobs");
                    if self.poll_and_enqueue().await.is_break() {
                        break;
                    }
                }
            }
        }
    }

    /// One poll pass. Breaks when the loop has to exit.
    async fn poll_and_enqueue(&self) -> ControlFlow<()> {
        let jobs = match self.source.read(Utc::now()).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read jobs, will try again at the next tick");
                return ControlFlow::Continue(());
            }
        };

        let mut jobs = jobs.take(self.max_jobs_per_poll);
        let mut enqueued = 0usize;
        while let Some(job) = jobs.next().await {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::info!(enqueued, "JobProducer received quit signal while enqueueing");
                    return ControlFlow::Break(());
                }
                sent = self.queue.send(job) => {
                    if sent.is_err() {
                        tracing::warn!(enqueued, "Job queue closed, JobProducer exiting");
                        return ControlFlow::Break(());
                    }
                    enqueued += 1;
                }
            }
        }

        tracing::info!(enqueued, "JobProducer enqueued jobs");
        ControlFlow::Continue(())
    }
}
