//! Observability scope for guarded actions: memory sampling and the
//! Prometheus endpoint.

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Samples resident memory when created and logs the delta when dropped.
///
/// Dropping happens on every exit path of the scope, including early
/// returns and unwinding.
pub struct MemoryTracker {
    start_rss: Option<u64>,
    started: Instant,
}

impl MemoryTracker {
    /// Start tracking. A disabled tracker logs nothing.
    pub fn start(enabled: bool) -> Self {
        let start_rss = if enabled { process_rss() } else { None };
        if let Some(rss) = start_rss {
            debug!(rss = %format_bytes(rss), "Memory at action start");
        }
        Self {
            start_rss,
            started: Instant::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.start_rss.is_some()
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        let Some(start) = self.start_rss else {
            return;
        };
        let end = process_rss().unwrap_or(start);
        let delta = end as i64 - start as i64;
        info!(
            start = %format_bytes(start),
            end = %format_bytes(end),
            delta_bytes = delta,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Memory usage"
        );
    }
}

/// Current process RSS in bytes, if the platform exposes it.
pub fn process_rss() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

const SIZE_UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

/// Byte count with a binary unit, e.g. `512 B` or `2.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", SIZE_UNITS[unit])
}

/// Handler for the /metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    match packrat_repo::metrics::encode_metrics() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` on `addr` in a detached task.
///
/// Bind and serve failures are logged; they never reach the caller.
pub fn spawn_metrics_listener(addr: SocketAddr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Failed to bind metrics listener");
                return;
            }
        };
        info!(addr = %addr, "Serving metrics");
        if let Err(e) = axum::serve(listener, metrics_router()).await {
            error!(addr = %addr, error = %e, "Metrics listener failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_picks_binary_unit() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 / 2), "2.5 MiB");
        assert_eq!(format_bytes(3 << 30), "3.0 GiB");
        assert_eq!(format_bytes(2048 << 40), "2048.0 TiB");
    }

    #[test]
    fn test_disabled_tracker_samples_nothing() {
        let tracker = MemoryTracker::start(false);
        assert!(!tracker.is_active());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_rss_on_linux() {
        // Sandboxes may hide /proc; only check the value when it is present.
        if let Some(rss) = process_rss() {
            assert!(rss > 1024 * 1024, "RSS should be > 1MB, got {rss}");
            assert!(MemoryTracker::start(true).is_active());
        }
    }

    #[tokio::test]
    async fn test_metrics_handler_serves_text_format() {
        packrat_repo::metrics::register_metrics().unwrap();
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
