/// Metrics and telemetry for the reporter API
///
/// Prometheus metrics for monitoring:
/// - HTTP request counts and latencies per route
/// - Domain events (reports, votes, uploads, registrations)
///
/// The request series are also read back in-process by the system
/// performance analytics, so usage figures there are real observations.
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{
    core::Collector, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Encoder, Gauge, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

lazy_static! {
    /// Moment metrics collection started
    pub static ref STARTED_AT: DateTime<Utc> = Utc::now();

    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reporter_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "reporter_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "route"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "reporter_http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Domain Metrics ==========

    pub static ref REPORTS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "reporter_reports_created_total",
        "Total number of reports created"
    )
    .unwrap();

    /// Votes by resulting state
    pub static ref VOTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reporter_votes_total",
        "Total number of votes cast, by resulting state",
        &["state"]
    )
    .unwrap();

    pub static ref IMAGE_UPLOADS_TOTAL: IntCounter = register_int_counter!(
        "reporter_image_uploads_total",
        "Total number of images uploaded"
    )
    .unwrap();

    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "reporter_registrations_total",
        "Total number of accounts registered"
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "reporter_uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> ApiResult<String> {
    UPTIME_SECONDS.set(uptime_seconds());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| ApiError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}

/// Seconds since metrics collection started
pub fn uptime_seconds() -> f64 {
    (Utc::now() - *STARTED_AT).num_milliseconds() as f64 / 1000.0
}

/// Record an HTTP request
pub fn record_http_request(method: &str, route: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route])
        .observe(duration);
}

/// Count and time every routed request.
///
/// Labels use the route template (`/api/report/:id`), never the raw path,
/// so label cardinality stays bounded.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();

    let start = Instant::now();
    HTTP_REQUESTS_ACTIVE.inc();

    let response = next.run(req).await;

    HTTP_REQUESTS_ACTIVE.dec();
    record_http_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Observed traffic for one route
#[derive(Debug, Clone, Serialize)]
pub struct RouteUsage {
    pub method: String,
    pub route: String,
    pub requests: u64,
    pub avg_response_ms: f64,
}

/// Observed request outcomes across all routes
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusTotals {
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
}

fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
    metric
        .get_label()
        .iter()
        .find(|pair| pair.get_name() == name)
        .map(|pair| pair.get_value())
        .unwrap_or("")
}

/// Per-route request counts and mean latency, busiest first
pub fn route_usage() -> Vec<RouteUsage> {
    let mut usage: BTreeMap<(String, String), (u64, f64)> = BTreeMap::new();

    for family in HTTP_REQUEST_DURATION_SECONDS.collect() {
        for metric in family.get_metric() {
            let histogram = metric.get_histogram();
            let key = (
                label(metric, "method").to_string(),
                label(metric, "route").to_string(),
            );
            let entry = usage.entry(key).or_insert((0, 0.0));
            entry.0 += histogram.get_sample_count();
            entry.1 += histogram.get_sample_sum();
        }
    }

    let mut routes: Vec<RouteUsage> = usage
        .into_iter()
        .filter(|(_, (count, _))| *count > 0)
        .map(|((method, route), (count, sum))| RouteUsage {
            method,
            route,
            requests: count,
            avg_response_ms: sum / count as f64 * 1000.0,
        })
        .collect();

    routes.sort_by(|a, b| b.requests.cmp(&a.requests));
    routes
}

/// Request totals split by status class
pub fn status_totals() -> StatusTotals {
    let mut totals = StatusTotals::default();

    for family in HTTP_REQUESTS_TOTAL.collect() {
        for metric in family.get_metric() {
            let count = metric.get_counter().get_value() as u64;
            let status: u16 = label(metric, "status").parse().unwrap_or(0);

            totals.requests += count;
            match status {
                400..=499 => totals.client_errors += count,
                500..=599 => totals.server_errors += count,
                _ => {}
            }
        }
    }

    totals
}
