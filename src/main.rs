use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use jobrunner::config::{ConsumerConfig, ProducerConfig, RunnerConfig};
use jobrunner::demo::BatchSource;
use jobrunner::job::JobSource;
use jobrunner::runner::Runner;
use jobrunner::shutdown::install_shutdown_handler;
use jobrunner::store::{JobStore, StoreSource};

#[derive(Parser, Debug)]
#[command(name = "jobrunner")]
#[command(version)]
#[command(about = "In-process job runner: a minute-aligned poller feeding a bounded worker pool")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the producer, the worker pool and the jobs API until SIGTERM/SIGINT
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Number of workers (also the queue capacity); 0 means the default of 10
    #[arg(long, default_value = "10")]
    workers: usize,

    /// Seconds between polls; polls are aligned to multiples of this interval
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,

    /// Deadline for a single job, in seconds
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    job_timeout_secs: u64,

    /// Maximum number of jobs taken from the source per poll
    #[arg(long, default_value = "100")]
    max_jobs_per_poll: usize,

    /// Bound on each of the producer and worker pool stops, in seconds
    #[arg(long, default_value = "10")]
    shutdown_timeout_secs: u64,

    /// Port for the /jobs HTTP API (disabled when omitted)
    #[arg(long)]
    api_port: Option<u16>,

    /// Poll a demo source producing random sleep jobs instead of the job store
    #[arg(long)]
    demo: bool,

    /// Jobs produced per poll by the demo source
    #[arg(long, default_value = "100", requires = "demo")]
    demo_batch_size: usize,
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_addr: Option<SocketAddr> = match args.api_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let config = RunnerConfig {
        producer: ProducerConfig::default()
            .with_poll_interval(Duration::from_secs(args.poll_interval_secs))
            .with_max_jobs_per_poll(args.max_jobs_per_poll),
        consumer: ConsumerConfig::default()
            .with_workers(args.workers)
            .with_job_timeout(Duration::from_secs(args.job_timeout_secs)),
        shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        api_addr,
    };

    let store = Arc::new(RwLock::new(JobStore::new()));
    let source: Arc<dyn JobSource> = if args.demo {
        Arc::new(BatchSource::new(args.demo_batch_size))
    } else {
        Arc::new(StoreSource::new(
            store.clone(),
            config.producer.max_jobs_per_poll,
        ))
    };

    tracing::info!(
        workers = config.consumer.resolved_workers(),
        poll_interval_secs = args.poll_interval_secs,
        job_timeout_secs = args.job_timeout_secs,
        api_addr = ?config.api_addr,
        demo = args.demo,
        "Starting jobrunner"
    );

    let shutdown = install_shutdown_handler()?;
    let summary = Runner::new(config, source, store).run(shutdown).await?;

    if !summary.producer.is_clean() || !summary.consumer.is_clean() {
        tracing::warn!("jobrunner exited before all work was acknowledged");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Run(run_args) => run(run_args).await?,
    }

    Ok(())
}
