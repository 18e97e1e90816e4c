//! Prometheus metrics for snapshot production and garbage collection.

#[cfg(test)]
mod metrics_test;

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::Snapshot;
use crate::SnapshotKind;

pub(crate) const OUTCOME_SUCCESS: &str = "success";
pub(crate) const OUTCOME_FAILURE: &str = "failure";

lazy_static! {
    pub static ref SNAPSHOT_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshot_outcomes_total", "Snapshot captures by kind and outcome"),
        &["kind", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref LATEST_SNAPSHOT_REVISION: IntGaugeVec = IntGaugeVec::new(
        Opts::new("latest_snapshot_revision", "Last revision covered by the latest persisted snapshot"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref CAPTURE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("snapshot_capture_duration_seconds", "Capture and persist latency")
            .buckets(exponential_buckets(0.005, 2.0, 16).expect("valid buckets")),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref DELTA_BUFFER_BYTES: IntGauge = IntGauge::new(
        "delta_buffer_bytes",
        "Change volume buffered for the next delta snapshot"
    )
    .expect("metric can not be created");

    pub static ref GC_DELETIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("gc_deletions_total", "Garbage collector deletions by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SNAPSHOT_OUTCOMES.clone()),
        Box::new(LATEST_SNAPSHOT_REVISION.clone()),
        Box::new(CAPTURE_DURATION_SECONDS.clone()),
        Box::new(DELTA_BUFFER_BYTES.clone()),
        Box::new(GC_DELETIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

pub(crate) fn observe_capture_success(
    snapshot: &Snapshot,
    elapsed: Duration,
) {
    let kind = snapshot.kind.to_string();
    SNAPSHOT_OUTCOMES.with_label_values(&[&kind, OUTCOME_SUCCESS]).inc();
    LATEST_SNAPSHOT_REVISION
        .with_label_values(&[&kind])
        .set(snapshot.last_revision as i64);
    CAPTURE_DURATION_SECONDS
        .with_label_values(&[&kind])
        .observe(elapsed.as_secs_f64());
}

pub(crate) fn observe_capture_failure(kind: SnapshotKind) {
    SNAPSHOT_OUTCOMES
        .with_label_values(&[&kind.to_string(), OUTCOME_FAILURE])
        .inc();
}

/// Serves `/metrics` until `shutdown` fires.
pub async fn start_server(
    addr: SocketAddr,
    shutdown: CancellationToken,
) {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("serving metrics on {}", addr);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async move {
        shutdown.cancelled().await;
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_text(&REGISTRY))
}

pub(crate) fn gather_text(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
