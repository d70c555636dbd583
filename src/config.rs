use std::net::SocketAddr;
use std::time::Duration;

/// Worker count used when none (or zero) is configured.
pub const DEFAULT_WORKERS: usize = 10;

/// Configuration for the polling side of the runner.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Time between poll passes. Passes after the first are aligned to
    /// wall-clock multiples of this interval.
    pub poll_interval: Duration,
    /// Upper bound on jobs taken from the source in a single pass.
    pub max_jobs_per_poll: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_jobs_per_poll: 100,
        }
    }
}

impl ProducerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_jobs_per_poll(mut self, max_jobs_per_poll: usize) -> Self {
        self.max_jobs_per_poll = max_jobs_per_poll;
        self
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Number of workers, which is also the queue capacity.
    /// Zero means [`DEFAULT_WORKERS`].
    pub workers: usize,
    /// Deadline applied to every job execution
    pub job_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            job_timeout: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// The worker count actually spawned.
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    /// Bound applied separately to the producer stop and the consumer stop.
    pub shutdown_timeout: Duration,
    /// Address for the `/jobs` HTTP surface. `None` disables it.
    pub api_addr: Option<SocketAddr>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
            api_addr: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_api_addr(mut self, addr: SocketAddr) -> Self {
        self.api_addr = Some(addr);
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_config_default() {
        let cfg = ProducerConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.max_jobs_per_poll, 100);
    }

    #[test]
    fn consumer_config_default() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.job_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_workers_resolves_to_default() {
        let cfg = ConsumerConfig::default().with_workers(0);
        assert_eq!(cfg.resolved_workers(), DEFAULT_WORKERS);
    }

    #[test]
    fn explicit_workers_are_kept() {
        let cfg = ConsumerConfig::default().with_workers(50);
        assert_eq!(cfg.resolved_workers(), 50);
    }

    #[test]
    fn runner_config_default() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
        assert!(cfg.api_addr.is_none());
    }

    #[test]
    fn runner_config_builders() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let cfg = RunnerConfig::default()
            .with_api_addr(addr)
            .with_shutdown_timeout(Duration::from_secs(3));
        assert_eq!(cfg.api_addr, Some(addr));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(3));
    }
}
