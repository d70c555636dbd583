//! Worker pool that executes queued jobs.
//!
//! - **Queue**: bounded channel with one slot per worker, owned by the pool
//! - **Pool**: fixed set of workers, each running one job at a time under a deadline
//! - **Executor**: shell-command jobs backing stored job records
//!
//! # Components
//!
//! - [`JobConsumer`]: starts the workers, hands out the queue's send half, drains on stop
//! - [`JobSender`] / [`JobReceiver`]: the two halves of the queue
//! - [`CommandExecutor`]: runs `sh -c <command>` and captures its output
//!
//! # Execution Flow
//!
//! 1. A worker receives a job from the queue
//! 2. It derives a [`JobContext`](crate::job::JobContext) with the configured timeout
//! 3. The job runs until it returns or the context ends, whichever is first
//! 4. The outcome is counted in [`WorkerStats`] and the job is dropped
//!
//! Failed jobs are not retried.

pub mod executor;
pub mod pool;
pub mod queue;

pub use executor::{CommandExecutor, CommandJob, ExecutionResult};
pub use pool::{ConsumerState, JobConsumer, StatsSnapshot, WorkerStats};
pub use queue::{job_queue, JobReceiver, JobSender};
