use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use workhorse::config::{Settings, TransportKind};
use workhorse::metrics::{self, PrometheusObserver};
use workhorse::shutdown::install_shutdown_handler;
use workhorse::{
    telemetry, Job, Observers, Queue, RedisQueue, SimulatedSink, SqliteQueue, TracingObserver,
    WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "workhorse")]
#[command(version)]
#[command(about = "Job queue worker pool with retry and exponential backoff")]
#[command(propagate_version = true)]
struct Args {
    /// Path to the YAML config file
    #[arg(long, global = true, default_value = workhorse::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the worker pool until SIGINT/SIGTERM
    Worker {
        /// Number of workers (overrides config)
        #[arg(long)]
        workers: Option<i64>,
    },

    /// Put a job on the queue
    Enqueue {
        /// Raw job payload
        payload: String,

        /// Retry budget for this job
        #[arg(long, env = "JOB_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Base backoff in seconds for this job
        #[arg(long, env = "JOB_RETRY_DELAY")]
        retry_delay: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load_from(&args.config).context("failed to load configuration")?;

    match args.command {
        Commands::Worker { workers } => {
            if let Some(workers) = workers {
                settings.pool.size = workers;
            }
            run_worker(settings).await
        }
        Commands::Enqueue {
            payload,
            max_retries,
            retry_delay,
        } => run_enqueue(settings, payload, max_retries, retry_delay).await,
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn Queue>> {
    let queue: Arc<dyn Queue> = match settings.transport {
        TransportKind::Redis => {
            let queue = RedisQueue::connect(&settings.redis.url(), &settings.redis.queue_key)
                .await
                .with_context(|| format!("failed to connect to Redis at {}", settings.redis.addr))?;
            Arc::new(queue)
        }
        TransportKind::Sqlite => {
            let queue = SqliteQueue::new(&settings.sqlite.url, &settings.sqlite.queue_key)
                .await
                .with_context(|| format!("failed to open {}", settings.sqlite.url))?;
            Arc::new(queue)
        }
    };
    Ok(queue)
}

async fn run_worker(settings: Settings) -> anyhow::Result<()> {
    telemetry::init(settings.log.format);

    let queue = connect(&settings).await?;
    let shutdown = install_shutdown_handler();

    let prometheus = Arc::new(PrometheusObserver::new().context("failed to create metrics")?);
    let observer = Observers::new()
        .with(Arc::new(TracingObserver))
        .with(prometheus.clone());

    let metrics_handle = settings
        .metrics
        .listen_addr
        .map(|addr| metrics::spawn_server(addr, prometheus.clone(), shutdown.clone()));

    let sink = Arc::new(SimulatedSink::new(
        Duration::from_millis(settings.simulate.work_ms),
        settings.simulate.fail_attempts,
    ));

    let mut pool = WorkerPool::new(queue, sink, settings.pool_options())
        .with_observer(Arc::new(observer))
        .with_shutdown(shutdown.clone());
    pool.start();

    info!(
        workers = pool.size(),
        transport = ?settings.transport,
        "Waiting for jobs"
    );

    shutdown.cancelled().await;
    info!("Shutting down workers...");
    pool.join().await;

    if let Some(handle) = metrics_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Metrics task ended abnormally");
        }
    }

    Ok(())
}

async fn run_enqueue(
    settings: Settings,
    payload: String,
    max_retries: Option<u32>,
    retry_delay: Option<u64>,
) -> anyhow::Result<()> {
    let queue = connect(&settings).await?;

    let job = Job::new(payload)
        .with_max_retries(max_retries.unwrap_or(settings.retry.max_retries))
        .with_retry_delay(retry_delay.unwrap_or(settings.retry.delay_secs));

    queue.enqueue(&job).await.context("failed to enqueue job")?;

    println!("Job enqueued:");
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
