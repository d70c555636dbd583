use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobRunnerError {
    #[error("Job source read failed: {0}")]
    SourceRead(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job deadline exceeded")]
    DeadlineExceeded,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job store is at capacity")]
    StoreFull,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobRunnerError>;
