//! Prometheus metrics for the service

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "driver_monitor_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "driver_monitor_http_request_duration_seconds";
    pub const ALERTS_CREATED_TOTAL: &str = "driver_monitor_alerts_created_total";
    pub const MUSIC_COMMANDS_TOTAL: &str = "driver_monitor_music_commands_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_alert_created(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::ALERTS_CREATED_TOTAL, &labels).increment(1);
}

pub fn record_music_command(action: &str, ok: bool) {
    let labels = [
        ("action", action.to_string()),
        ("result", if ok { "ok" } else { "rejected" }.to_string()),
    ];
    counter!(names::MUSIC_COMMANDS_TOTAL, &labels).increment(1);
}

/// Counts requests by route template rather than raw URI
pub async fn track_requests(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
