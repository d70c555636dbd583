use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::config::RunnerConfig;
use crate::error::Result;
use crate::job::JobSource;
use crate::scheduler::JobProducer;
use crate::shutdown::StopOutcome;
use crate::store::{JobStore, StoreSource};
use crate::worker::{JobConsumer, StatsSnapshot};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub producer: StopOutcome,
    pub consumer: StopOutcome,
    pub stats: StatsSnapshot,
}

/// Host wiring that owns the producer, the worker pool and the jobs API.
pub struct Runner {
    config: RunnerConfig,
    source: Arc<dyn JobSource>,
    store: Arc<RwLock<JobStore>>,
}

impl Runner {
    pub fn new(config: RunnerConfig, source: Arc<dyn JobSource>, store: Arc<RwLock<JobStore>>) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Runner whose jobs come from the record store behind the API.
    pub fn with_store_source(config: RunnerConfig) -> Self {
        let store = Arc::new(RwLock::new(JobStore::new()));
        let source = StoreSource::new(store.clone(), config.producer.max_jobs_per_poll);
        Self::new(config, Arc::new(source), store)
    }

    pub fn store(&self) -> Arc<RwLock<JobStore>> {
        self.store.clone()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Startup order:
    /// 1. Worker pool, which allocates the queue
    /// 2. Producer, fed by the configured source
    /// 3. Jobs API, if an address is configured
    ///
    /// Shutdown stops the producer first so nothing is enqueued into a queue
    /// about to close, then the worker pool, then the API. The producer and
    /// the pool each get their own `shutdown_timeout`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary> {
        // Jobs are cancelled only at the very end, never by the shutdown signal.
        let jobs_root = CancellationToken::new();

        let mut consumer = JobConsumer::new(self.config.consumer.clone());
        let queue = consumer.start(&jobs_root)?;

        let mut producer = JobProducer::new(self.source.clone(), queue, self.config.producer.clone());
        producer.start()?;

        let api_shutdown = CancellationToken::new();
        let api_task = self.config.api_addr.map(|addr| {
            let state = ApiState {
                store: self.store.clone(),
            };
            let token = api_shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = run_api(addr, state, token).await {
                    tracing::error!(addr = %addr, error = %e, "Jobs API server failed");
                }
            })
        });

        shutdown.cancelled().await;
        tracing::info!("Shutdown requested, stopping producer then consumer");

        let producer_outcome = producer.stop(self.config.shutdown_timeout).await;
        let consumer_outcome = consumer.stop(self.config.shutdown_timeout).await;

        api_shutdown.cancel();
        if let Some(task) = api_task {
            if tokio::time::timeout(self.config.shutdown_timeout, task)
                .await
                .is_err()
            {
                tracing::warn!("Jobs API server did not stop before the deadline");
            }
        }
        jobs_root.cancel();

        let summary = RunSummary {
            producer: producer_outcome,
            consumer: consumer_outcome,
            stats: consumer.stats(),
        };
        tracing::info!(
            producer = %summary.producer,
            consumer = %summary.consumer,
            completed = summary.stats.completed,
            failed = summary.stats.failed,
            timed_out = summary.stats.timed_out,
            cancelled = summary.stats.cancelled,
            "jobrunner has completed"
        );
        Ok(summary)
    }
}
