use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{JobRunnerError, Result};
use crate::job::{Job, JobContext};
use crate::store::{JobStatus, JobStore};

/// Result of job execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Map the result onto the outcome reported to the worker pool.
    pub fn outcome(&self) -> Result<()> {
        match self.status {
            JobStatus::Completed => Ok(()),
            JobStatus::TimedOut => Err(JobRunnerError::DeadlineExceeded),
            JobStatus::Cancelled => Err(JobRunnerError::Cancelled),
            _ => Err(JobRunnerError::JobFailed(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("Exit code: {:?}", self.exit_code)),
            )),
        }
    }
}

/// Runs job commands through a shell.
///
/// The child process is killed as soon as the job context ends.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: String,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Execute `command` via `<shell> -c`, bounded by `ctx`
    pub async fn execute(&self, job_id: Uuid, command: &str, ctx: &JobContext) -> ExecutionResult {
        tracing::info!(job_id = %job_id, command, "Executing job");

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => Self::process_output(job_id, result),
            reason = ctx.done() => {
                let status = match reason {
                    JobRunnerError::DeadlineExceeded => JobStatus::TimedOut,
                    _ => JobStatus::Cancelled,
                };
                tracing::warn!(job_id = %job_id, status = %status, "Job interrupted");
                ExecutionResult {
                    job_id,
                    status,
                    exit_code: None,
                    output: None,
                    error: Some(reason.to_string()),
                }
            }
        }
    }

    fn process_output(
        job_id: Uuid,
        result: std::result::Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                let (status, error) = if output.status.success() {
                    (JobStatus::Completed, None)
                } else {
                    (
                        JobStatus::Failed,
                        Some(if stderr.is_empty() {
                            format!("Exit code: {:?}", exit_code)
                        } else {
                            stderr
                        }),
                    )
                };

                tracing::info!(
                    job_id = %job_id,
                    status = %status,
                    exit_code = ?exit_code,
                    "Job completed"
                );

                ExecutionResult {
                    job_id,
                    status,
                    exit_code,
                    output: if stdout.is_empty() {
                        None
                    } else {
                        Some(stdout)
                    },
                    error,
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job execution failed");
                ExecutionResult {
                    job_id,
                    status: JobStatus::Failed,
                    exit_code: None,
                    output: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// A stored job record executed as a shell command.
///
/// Dropping a job that never started hands its record back to the store as
/// pending, so the next poll can claim it again.
pub struct CommandJob {
    id: Uuid,
    command: String,
    executor: CommandExecutor,
    store: Arc<RwLock<JobStore>>,
    started: AtomicBool,
}

impl CommandJob {
    pub fn new(
        id: Uuid,
        command: String,
        executor: CommandExecutor,
        store: Arc<RwLock<JobStore>>,
    ) -> Self {
        Self {
            id,
            command,
            executor,
            store,
            started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Job for CommandJob {
    async fn execute(&self, ctx: &JobContext) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        let result = self.executor.execute(self.id, &self.command, ctx).await;
        let outcome = result.outcome();

        // Awaited, but on its own task: the write still lands if the worker
        // drops this future at the deadline.
        let store = self.store.clone();
        let write = tokio::spawn(async move {
            let recorded = store.write().await.record_result(&result);
            (result.job_id, recorded)
        });
        match write.await {
            Ok((_, true)) => {}
            Ok((job_id, false)) => {
                tracing::debug!(job_id = %job_id, "Job record removed before completion");
            }
            Err(e) => {
                tracing::error!(job_id = %self.id, error = %e, "Failed to record job result");
            }
        }

        outcome
    }
}

impl Drop for CommandJob {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            return;
        }
        tracing::debug!(job_id = %self.id, "Releasing job record that never ran");

        if let Ok(mut store) = self.store.try_write() {
            store.release(&self.id);
            return;
        }
        let (id, store) = (self.id, self.store.clone());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.write().await.release(&id);
                });
            }
            Err(_) => {
                tracing::warn!(job_id = %id, "No runtime to release job record, it stays running");
            }
        }
    }
}
