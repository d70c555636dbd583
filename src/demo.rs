//! Illustrative job and source used by `jobrunner run --demo`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::Result;
use crate::job::{job_stream, Job, JobContext, JobSource, JobStream};

/// Sleeps for a random duration, giving up when its context ends.
#[derive(Debug, Clone)]
pub struct SleepyJob {
    max_sleep: Duration,
}

impl SleepyJob {
    pub fn new(max_sleep: Duration) -> Self {
        Self { max_sleep }
    }
}

#[async_trait]
impl Job for SleepyJob {
    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        let max_ms = self.max_sleep.as_millis() as u64;
        let sleep = Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms));

        tokio::select! {
            biased;
            reason = ctx.done() => {
                tracing::info!(reason = %reason, "Demo job interrupted");
                Err(reason)
            }
            _ = tokio::time::sleep(sleep) => Ok(()),
        }
    }
}

/// Produces a fixed batch of [`SleepyJob`]s on every poll.
#[derive(Debug, Clone)]
pub struct BatchSource {
    batch_size: usize,
    max_sleep: Duration,
}

impl Default for BatchSource {
    fn default() -> Self {
        Self::new(100)
    }
}

impl BatchSource {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            max_sleep: Duration::from_secs(2),
        }
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }
}

#[async_trait]
impl JobSource for BatchSource {
    async fn read(&self, _poll_time: DateTime<Utc>) -> Result<JobStream> {
        let jobs: Vec<Box<dyn Job>> = (0..self.batch_size)
            .map(|_| Box::new(SleepyJob::new(self.max_sleep)) as Box<dyn Job>)
            .collect();
        Ok(job_stream(jobs))
    }
}
