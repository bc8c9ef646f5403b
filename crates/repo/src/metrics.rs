//! Prometheus metrics for repository operations.
//!
//! Metrics are always recorded; they are only exported once
//! `register_metrics()` has succeeded and a listener serves `REGISTRY`.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::{LazyLock, OnceLock};
use thiserror::Error;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Verification metrics
pub static CONTENTS_VERIFIED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "packrat_contents_verified_total",
            "Total content records verified, by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static VERIFY_BLOBS_LISTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packrat_verify_blobs_listed_total",
        "Total blobs listed to build verification blob maps",
    )
    .expect("metric creation failed")
});

// Write session metrics
pub static WRITE_SESSIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "packrat_write_sessions_total",
            "Total write sessions, by purpose and outcome",
        ),
        &["purpose", "outcome"],
    )
    .expect("metric creation failed")
});

pub static ACTIVE_WRITE_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "packrat_active_write_sessions",
        "Current number of open write sessions",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packrat_bytes_uploaded_total",
        "Total pack blob bytes uploaded by write sessions",
    )
    .expect("metric creation failed")
});

// Maintenance metrics
pub static MAINTENANCE_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "packrat_maintenance_runs_total",
            "Total maintenance runs, by mode and outcome",
        ),
        &["mode", "outcome"],
    )
    .expect("metric creation failed")
});

pub static MAINTENANCE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "packrat_maintenance_duration_seconds",
            "Time taken by a maintenance run",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
    )
    .expect("metric creation failed")
});

pub static MAINTENANCE_BYTES_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packrat_maintenance_bytes_reclaimed_total",
        "Total bytes reclaimed by deleting unreferenced pack blobs",
    )
    .expect("metric creation failed")
});

/// Metric registration failure.
#[derive(Clone, Debug, Error)]
#[error("metric registration failed: {0}")]
pub struct MetricsError(String);

static REGISTERED: OnceLock<Result<(), MetricsError>> = OnceLock::new();

/// Register all metrics with `REGISTRY`.
///
/// Registration happens once; later calls return the first outcome.
pub fn register_metrics() -> Result<(), MetricsError> {
    REGISTERED
        .get_or_init(|| {
            let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
                Box::new(CONTENTS_VERIFIED.clone()),
                Box::new(VERIFY_BLOBS_LISTED.clone()),
                Box::new(WRITE_SESSIONS.clone()),
                Box::new(ACTIVE_WRITE_SESSIONS.clone()),
                Box::new(BYTES_UPLOADED.clone()),
                Box::new(MAINTENANCE_RUNS.clone()),
                Box::new(MAINTENANCE_DURATION.clone()),
                Box::new(MAINTENANCE_BYTES_RECLAIMED.clone()),
            ];
            for collector in collectors {
                REGISTRY
                    .register(collector)
                    .map_err(|e| MetricsError(e.to_string()))?;
            }
            Ok(())
        })
        .clone()
}

/// Encode every registered metric in the Prometheus text format.
pub fn encode_metrics() -> Result<Vec<u8>, MetricsError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MetricsError(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();

        CONTENTS_VERIFIED.with_label_values(&["success"]).inc();
        let text = String::from_utf8(encode_metrics().unwrap()).unwrap();
        assert!(text.contains("packrat_contents_verified_total"));
    }
}
