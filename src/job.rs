//! Capabilities shared by the producer and the worker pool.
//!
//! A [`JobSource`] is polled for work and hands back a [`JobStream`]; every
//! [`Job`] pulled from that stream travels through the queue and is executed
//! once by a single worker under a [`JobContext`].

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{JobRunnerError, Result};

/// Finite, single-use sequence of jobs produced by one poll.
pub type JobStream = Pin<Box<dyn Stream<Item = Box<dyn Job>> + Send>>;

/// A unit of work.
///
/// Implementations should watch `ctx` and return promptly once it is done.
/// A job that ignores its context is still interrupted at the deadline, but
/// any work it started outside its own future keeps running.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, ctx: &JobContext) -> Result<()>;
}

/// External provider of jobs, polled by the producer.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Return the jobs available as of `poll_time`.
    async fn read(&self, poll_time: DateTime<Utc>) -> Result<JobStream>;
}

/// Wrap an in-memory batch as a [`JobStream`].
pub fn job_stream<I>(jobs: I) -> JobStream
where
    I: IntoIterator<Item = Box<dyn Job>>,
    I::IntoIter: Send + 'static,
{
    Box::pin(tokio_stream::iter(jobs))
}

/// Cancellation and deadline scope for a single job execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    token: CancellationToken,
    deadline: Instant,
}

impl JobContext {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self::with_deadline(token, Instant::now() + timeout)
    }

    pub fn with_deadline(token: CancellationToken, deadline: Instant) -> Self {
        Self { token, deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait until the context ends and report why.
    ///
    /// Cancellation wins over an elapsed deadline when both are observed.
    pub async fn done(&self) -> JobRunnerError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => JobRunnerError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => JobRunnerError::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn done_reports_deadline() {
        let ctx = JobContext::new(CancellationToken::new(), Duration::from_secs(5));
        assert!(!ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::from_secs(5));

        let reason = ctx.done().await;
        assert!(matches!(reason, JobRunnerError::DeadlineExceeded));
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_fixed_at_creation() {
        let start = Instant::now();
        let ctx = JobContext::new(CancellationToken::new(), Duration::from_secs(5));
        assert_eq!(ctx.deadline(), start + Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(ctx.deadline(), start + Duration::from_secs(5));
        assert_eq!(ctx.remaining(), Duration::from_secs(3));

        let explicit = JobContext::with_deadline(CancellationToken::new(), start);
        assert!(explicit.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn done_reports_cancellation() {
        let parent = CancellationToken::new();
        let ctx = JobContext::new(parent.child_token(), Duration::from_secs(5));

        parent.cancel();
        let reason = ctx.done().await;
        assert!(matches!(reason, JobRunnerError::Cancelled));
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let ctx = JobContext::new(parent.child_token(), Duration::from_secs(5));

        ctx.cancel();
        assert!(ctx.is_done());
        assert!(!parent.is_cancelled());
    }
}
