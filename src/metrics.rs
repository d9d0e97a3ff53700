use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::job::{JobId, JobStatus};
use crate::observer::{AttemptOutcome, AttemptRecord, Observer, QueueOp};
use crate::storage::QueueError;

/// Metric name prefix
const PREFIX: &str = "workhorse";

/// Prometheus-backed observer. Owns its registry so several pools (or tests)
/// can live in one process without clashing.
#[derive(Clone)]
pub struct PrometheusObserver {
    registry: Registry,
    processed: IntCounter,
    succeeded: IntCounter,
    failed: IntCounter,
    retried: IntCounter,
    abandoned: IntCounter,
    transport_errors: IntCounterVec,
    queue_depth: IntGauge,
    jobs_by_status: IntGaugeVec,
    attempt_duration: Histogram,
}

impl PrometheusObserver {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let processed = IntCounter::new(
            format!("{PREFIX}_jobs_processed_total"),
            "Total number of job attempts processed",
        )?;
        let succeeded = IntCounter::new(
            format!("{PREFIX}_jobs_succeeded_total"),
            "Total number of jobs that succeeded",
        )?;
        let failed = IntCounter::new(
            format!("{PREFIX}_jobs_failed_total"),
            "Total number of failed job attempts",
        )?;
        let retried = IntCounter::new(
            format!("{PREFIX}_jobs_retried_total"),
            "Total number of job retries scheduled",
        )?;
        let abandoned = IntCounter::new(
            format!("{PREFIX}_jobs_abandoned_total"),
            "Total number of jobs dropped after exhausting retries",
        )?;
        let transport_errors = IntCounterVec::new(
            Opts::new(
                format!("{PREFIX}_transport_errors_total"),
                "Queue transport errors by operation",
            ),
            &["op"],
        )?;
        let queue_depth = IntGauge::new(
            format!("{PREFIX}_queue_depth"),
            "Number of jobs currently waiting in the queue",
        )?;
        let jobs_by_status = IntGaugeVec::new(
            Opts::new(format!("{PREFIX}_jobs"), "Jobs currently held by workers, by status"),
            &["status"],
        )?;
        let attempt_duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{PREFIX}_attempt_duration_seconds"),
                "Duration of a worker iteration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(succeeded.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(retried.clone()))?;
        registry.register(Box::new(abandoned.clone()))?;
        registry.register(Box::new(transport_errors.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(jobs_by_status.clone()))?;
        registry.register(Box::new(attempt_duration.clone()))?;

        Ok(Self {
            registry,
            processed,
            succeeded,
            failed,
            retried,
            abandoned,
            transport_errors,
            queue_depth,
            jobs_by_status,
            attempt_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Observer for PrometheusObserver {
    fn attempt_started(&self, _worker_id: usize, _job_id: &JobId) {
        self.jobs_by_status
            .with_label_values(&[JobStatus::Running.as_str()])
            .inc();
    }

    fn record_attempt(&self, record: &AttemptRecord) {
        self.jobs_by_status
            .with_label_values(&[JobStatus::Running.as_str()])
            .dec();
        self.processed.inc();
        self.attempt_duration.observe(record.duration.as_secs_f64());

        match record.outcome {
            AttemptOutcome::Succeeded => self.succeeded.inc(),
            AttemptOutcome::Retried { .. } => {
                self.failed.inc();
                self.retried.inc();
            }
            AttemptOutcome::Abandoned | AttemptOutcome::Dropped => {
                self.failed.inc();
                self.abandoned.inc();
            }
        }
    }

    fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn transport_error(&self, op: QueueOp, _error: &QueueError) {
        self.transport_errors.with_label_values(&[op.as_str()]).inc();
    }
}

pub fn router(metrics: Arc<PrometheusObserver>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusObserver>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Serve `/metrics` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<PrometheusObserver>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Metrics endpoint listening");
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Run [`serve`] on its own task. A bind or serve failure is logged and
/// ends the task; it never takes the worker pool down with it.
pub fn spawn_server(
    addr: SocketAddr,
    metrics: Arc<PrometheusObserver>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(addr, metrics, shutdown).await {
            error!(%addr, error = %e, "Metrics endpoint failed");
        }
    })
}
