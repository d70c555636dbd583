//! Shared jobs, sources and polling helpers for the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use jobrunner::error::{JobRunnerError, Result};
use jobrunner::job::{job_stream, Job, JobContext, JobSource, JobStream};

/// Appends its tag to a shared log when executed.
pub struct RecordingJob {
    pub tag: usize,
    pub log: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Job for RecordingJob {
    async fn execute(&self, _ctx: &JobContext) -> Result<()> {
        self.log.lock().unwrap().push(self.tag);
        Ok(())
    }
}

/// Sleeps without looking at its context.
pub struct StubbornJob {
    pub duration: Duration,
}

#[async_trait]
impl Job for StubbornJob {
    async fn execute(&self, _ctx: &JobContext) -> Result<()> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Sleeps for a fixed duration, returning early when its context ends.
pub struct SleepJob {
    pub duration: Duration,
}

#[async_trait]
impl Job for SleepJob {
    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        tokio::select! {
            reason = ctx.done() => Err(reason),
            _ = tokio::time::sleep(self.duration) => Ok(()),
        }
    }
}

/// Flags that it started, then waits for its context to end and returns the reason.
pub struct WaitForContextJob {
    pub started: Arc<AtomicBool>,
}

#[async_trait]
impl Job for WaitForContextJob {
    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Err(ctx.done().await)
    }
}

pub struct FailingJob;

#[async_trait]
impl Job for FailingJob {
    async fn execute(&self, _ctx: &JobContext) -> Result<()> {
        Err(JobRunnerError::JobFailed("boom".to_string()))
    }
}

/// Source that records when it is read and returns tagged [`RecordingJob`]s.
#[derive(Clone)]
pub struct TestSource {
    pub reads: Arc<Mutex<Vec<Instant>>>,
    pub log: Arc<Mutex<Vec<usize>>>,
    batch_size: usize,
    fail: bool,
}

impl TestSource {
    pub fn batch(batch_size: usize) -> Self {
        Self {
            reads: Arc::new(Mutex::new(Vec::new())),
            log: Arc::new(Mutex::new(Vec::new())),
            batch_size,
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self::batch(0)
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::batch(0)
        }
    }

    pub fn read_times(&self) -> Vec<Instant> {
        self.reads.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    pub fn executed(&self) -> Vec<usize> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobSource for TestSource {
    async fn read(&self, _poll_time: DateTime<Utc>) -> Result<JobStream> {
        self.reads.lock().unwrap().push(Instant::now());
        if self.fail {
            return Err(JobRunnerError::SourceRead("source unavailable".to_string()));
        }
        let jobs: Vec<Box<dyn Job>> = (0..self.batch_size)
            .map(|tag| {
                Box::new(RecordingJob {
                    tag,
                    log: self.log.clone(),
                }) as Box<dyn Job>
            })
            .collect();
        Ok(job_stream(jobs))
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    condition().await
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
