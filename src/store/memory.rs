use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{JobRunnerError, Result};
use crate::store::record::{JobRecord, JobStatus};
use crate::worker::executor::ExecutionResult;

const DEFAULT_MAX_JOBS: usize = 10_000;

/// In-memory job records. Nothing survives a restart.
#[derive(Debug)]
pub struct JobStore {
    jobs: HashMap<Uuid, JobRecord>,
    max_jobs: usize,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            max_jobs,
        }
    }

    /// Add a record. Fails with `StoreFull` once the store is at capacity.
    pub fn add(&mut self, record: JobRecord) -> Result<Uuid> {
        if self.is_full() {
            return Err(JobRunnerError::StoreFull);
        }
        let id = record.id;
        self.jobs.insert(id, record);
        Ok(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    /// Change the command and/or schedule of a record that has not started.
    pub fn update(
        &mut self,
        id: &Uuid,
        command: Option<String>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<&JobRecord> {
        let record = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobRunnerError::JobNotFound(id.to_string()))?;

        if record.status != JobStatus::Pending {
            return Err(JobRunnerError::Conflict(format!(
                "job {} is {} and can no longer be changed",
                id, record.status
            )));
        }
        if let Some(command) = command {
            if command.trim().is_empty() {
                return Err(JobRunnerError::InvalidRequest(
                    "command must not be empty".to_string(),
                ));
            }
            record.command = command;
        }
        if let Some(run_at) = run_at {
            record.run_at = run_at;
        }
        record.updated_at = Utc::now();
        Ok(record)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.remove(id)
    }

    /// All records, oldest first.
    pub fn all_jobs(&self) -> Vec<&JobRecord> {
        let mut jobs: Vec<&JobRecord> = self.jobs.values().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    /// One page of [`JobStore::all_jobs`] plus the total record count.
    pub fn list(&self, offset: usize, limit: usize) -> (Vec<&JobRecord>, usize) {
        let all = self.all_jobs();
        let total = all.len();
        let page = all.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    pub fn pending_jobs(&self) -> Vec<&JobRecord> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .collect()
    }

    /// Ids of up to `limit` records due at `now`, earliest `run_at` first.
    /// Nothing is marked.
    pub fn due_ids(&self, now: DateTime<Utc>, limit: usize) -> Vec<Uuid> {
        let mut due: Vec<(DateTime<Utc>, DateTime<Utc>, Uuid)> = self
            .jobs
            .values()
            .filter(|j| j.is_due(now))
            .map(|j| (j.run_at, j.created_at, j.id))
            .collect();
        due.sort();
        due.into_iter().take(limit).map(|(_, _, id)| id).collect()
    }

    /// Mark one record as running if it is still due, returning its command.
    pub fn claim(&mut self, id: &Uuid, now: DateTime<Utc>) -> Option<String> {
        let record = self.jobs.get_mut(id).filter(|j| j.is_due(now))?;
        record.status = JobStatus::Running;
        record.updated_at = now;
        Some(record.command.clone())
    }

    /// Mark up to `limit` due records as running and return them, earliest
    /// `run_at` first.
    pub fn claim_due(&mut self, now: DateTime<Utc>, limit: usize) -> Vec<(Uuid, String)> {
        self.due_ids(now, limit)
            .into_iter()
            .filter_map(|id| self.claim(&id, now).map(|command| (id, command)))
            .collect()
    }

    /// Put a claimed record that never ran back to pending.
    pub fn release(&mut self, id: &Uuid) -> bool {
        match self.jobs.get_mut(id) {
            Some(record) if record.status == JobStatus::Running => {
                record.status = JobStatus::Pending;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Store the outcome of an execution. Returns false if the record is gone.
    pub fn record_result(&mut self, result: &ExecutionResult) -> bool {
        if let Some(record) = self.jobs.get_mut(&result.job_id) {
            let now = Utc::now();
            record.status = result.status;
            record.exit_code = result.exit_code;
            record.output = result.output.clone();
            record.error = result.error.clone();
            record.updated_at = now;
            record.completed_at = Some(now);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.max_jobs
    }
}
