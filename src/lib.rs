pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod job;
pub mod runner;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use error::{JobRunnerError, Result};
pub use job::{job_stream, Job, JobContext, JobSource, JobStream};
