use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::job::{Job, JobSource, JobStream};
use crate::store::JobStore;
use crate::worker::executor::{CommandExecutor, CommandJob};

/// Job source over the record store.
///
/// Every poll looks up the records that are due and claims them one at a
/// time as the stream is pulled, turning each into a [`CommandJob`]. Records
/// the producer never pulls stay pending for the next poll.
pub struct StoreSource {
    store: Arc<RwLock<JobStore>>,
    executor: CommandExecutor,
    batch_limit: usize,
}

impl StoreSource {
    /// `batch_limit` bounds how many due records one poll looks at.
    pub fn new(store: Arc<RwLock<JobStore>>, batch_limit: usize) -> Self {
        Self {
            store,
            executor: CommandExecutor::new(),
            batch_limit,
        }
    }

    pub fn with_executor(mut self, executor: CommandExecutor) -> Self {
        self.executor = executor;
        self
    }
}

struct Claims {
    due: std::vec::IntoIter<Uuid>,
    poll_time: DateTime<Utc>,
    store: Arc<RwLock<JobStore>>,
    executor: CommandExecutor,
}

#[async_trait]
impl JobSource for StoreSource {
    async fn read(&self, poll_time: DateTime<Utc>) -> Result<JobStream> {
        let due = self.store.read().await.due_ids(poll_time, self.batch_limit);
        tracing::debug!(due = due.len(), "Found due job records");

        let claims = Claims {
            due: due.into_iter(),
            poll_time,
            store: self.store.clone(),
            executor: self.executor.clone(),
        };

        let jobs = stream::unfold(claims, |mut claims| async move {
            while let Some(id) = claims.due.next() {
                // Skipped when no longer due since the lookup.
                let claimed = claims.store.write().await.claim(&id, claims.poll_time);
                if let Some(command) = claimed {
                    let job = CommandJob::new(
                        id,
                        command,
                        claims.executor.clone(),
                        claims.store.clone(),
                    );
                    return Some((Box::new(job) as Box<dyn Job>, claims));
                }
            }
            None
        });

        Ok(Box::pin(jobs))
    }
}
