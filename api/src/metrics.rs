//! Prometheus metric definitions (AMBIENT, SPEC_FULL.md §2). Mirrors the
//! teacher's `metrics.rs` shape — `Lazy` statics registered once into a
//! custom `Registry`, one counter/histogram per pipeline stage outcome —
//! with the metric families renamed for the cost-optimization domain.

use once_cell::sync::Lazy;
use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

macro_rules! counter_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| IntCounterVec::new(opts!($name, $help), $labels).unwrap())
    };
}
macro_rules! histogram_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| {
            HistogramVec::new(HistogramOpts::new($name, $help).buckets(LATENCY_BUCKETS.to_vec()), $labels)
                .unwrap()
        })
    };
}
macro_rules! counter {
    ($name:expr, $help:expr) => {
        Lazy::new(|| IntCounter::new($name, $help).unwrap())
    };
}
macro_rules! gauge {
    ($name:expr, $help:expr) => {
        Lazy::new(|| IntGauge::new($name, $help).unwrap())
    };
}

const LATENCY_BUCKETS: [f64; 14] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

// ── HTTP ────────────────────────────────────────────────────────────────────
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("http_requests_total", "Total HTTP requests", &["method", "path", "status"]);
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> =
    histogram_vec!("http_request_duration_seconds", "HTTP request latency", &["method", "path"]);
pub static HTTP_IN_FLIGHT: Lazy<IntGauge> = gauge!("http_requests_in_flight", "In-flight HTTP requests");

// ── Scan (spec §4.3) ─────────────────────────────────────────────────────
pub static SCAN_RUNS_TOTAL: Lazy<IntCounter> = counter!("scan_runs_total", "Scans started");
pub static SCAN_DURATION: Lazy<HistogramVec> =
    histogram_vec!("scan_duration_seconds", "Scan wall-clock duration", &["outcome"]);
pub static SCAN_FINDINGS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("scan_findings_total", "Findings emitted by the scanner", &["recommendation_type"]);
pub static SCAN_BUCKET_ERRORS_TOTAL: Lazy<IntCounter> =
    counter!("scan_bucket_errors_total", "Non-fatal per-bucket scan errors");

// ── Score (spec §4.4) ───────────────────────────────────────────────────
pub static SCORE_RUNS_TOTAL: Lazy<IntCounter> = counter!("score_runs_total", "Scoring passes run");
pub static SCORE_DURATION: Lazy<HistogramVec> =
    histogram_vec!("score_duration_seconds", "Scoring pass duration", &["outcome"]);
pub static SCORE_RISK_LEVEL_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("score_risk_level_total", "Scored findings by risk level", &["risk_level"]);

// ── Execute (spec §4.6) ─────────────────────────────────────────────────
pub static EXECUTE_BATCHES_TOTAL: Lazy<IntCounter> = counter!("execute_batches_total", "Execution batches run");
pub static EXECUTE_DURATION: Lazy<HistogramVec> =
    histogram_vec!("execute_duration_seconds", "Execution batch duration", &["mode"]);
pub static EXECUTE_ACTION_STATUS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("execute_action_status_total", "Per-action outcomes", &["status"]);

// ── Rollback (spec §4.7) ────────────────────────────────────────────────
pub static ROLLBACK_BATCHES_TOTAL: Lazy<IntCounter> = counter!("rollback_batches_total", "Rollback batches run");
pub static ROLLBACK_ACTION_STATUS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("rollback_action_status_total", "Per-record rollback outcomes", &["status"]);

// ── Database / run store ────────────────────────────────────────────────
pub static DB_QUERY_DURATION: Lazy<HistogramVec> =
    histogram_vec!("db_query_duration_seconds", "Database query latency", &["operation"]);
pub static DB_QUERY_ERRORS: Lazy<IntCounter> = counter!("db_query_errors_total", "DB query errors");
pub static RUNS_ACTIVE: Lazy<IntGauge> = gauge!("runs_active", "Runs currently tracked by the store");

// ── System ──────────────────────────────────────────────────────────────
pub static PROCESS_START_TIME: Lazy<IntGauge> = gauge!("process_start_time_seconds", "Process start time");

pub fn register_all(r: &Registry) -> prometheus::Result<()> {
    r.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    r.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    r.register(Box::new(HTTP_IN_FLIGHT.clone()))?;
    r.register(Box::new(SCAN_RUNS_TOTAL.clone()))?;
    r.register(Box::new(SCAN_DURATION.clone()))?;
    r.register(Box::new(SCAN_FINDINGS_TOTAL.clone()))?;
    r.register(Box::new(SCAN_BUCKET_ERRORS_TOTAL.clone()))?;
    r.register(Box::new(SCORE_RUNS_TOTAL.clone()))?;
    r.register(Box::new(SCORE_DURATION.clone()))?;
    r.register(Box::new(SCORE_RISK_LEVEL_TOTAL.clone()))?;
    r.register(Box::new(EXECUTE_BATCHES_TOTAL.clone()))?;
    r.register(Box::new(EXECUTE_DURATION.clone()))?;
    r.register(Box::new(EXECUTE_ACTION_STATUS_TOTAL.clone()))?;
    r.register(Box::new(ROLLBACK_BATCHES_TOTAL.clone()))?;
    r.register(Box::new(ROLLBACK_ACTION_STATUS_TOTAL.clone()))?;
    r.register(Box::new(DB_QUERY_DURATION.clone()))?;
    r.register(Box::new(DB_QUERY_ERRORS.clone()))?;
    r.register(Box::new(RUNS_ACTIVE.clone()))?;
    r.register(Box::new(PROCESS_START_TIME.clone()))?;
    Ok(())
}

pub fn gather_metrics(r: &Registry) -> String {
    let encoder = TextEncoder::new();
    let families = r.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).unwrap_or_default();
    String::from_utf8(buf).unwrap_or_default()
}

pub fn observe_http(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL.with_label_values(&[method, path, &status.to_string()]).inc();
    HTTP_REQUEST_DURATION.with_label_values(&[method, path]).observe(duration_secs);
}

pub fn observe_scan(outcome: &str, duration_secs: f64, findings_by_type: &[(&str, usize)], bucket_errors: usize) {
    SCAN_RUNS_TOTAL.inc();
    SCAN_DURATION.with_label_values(&[outcome]).observe(duration_secs);
    for (rec_type, count) in findings_by_type {
        SCAN_FINDINGS_TOTAL.with_label_values(&[rec_type]).inc_by(*count as u64);
    }
    SCAN_BUCKET_ERRORS_TOTAL.inc_by(bucket_errors as u64);
}

pub fn observe_score(outcome: &str, duration_secs: f64, risk_levels: &[(&str, usize)]) {
    SCORE_RUNS_TOTAL.inc();
    SCORE_DURATION.with_label_values(&[outcome]).observe(duration_secs);
    for (level, count) in risk_levels {
        SCORE_RISK_LEVEL_TOTAL.with_label_values(&[level]).inc_by(*count as u64);
    }
}

pub fn observe_execute(mode: &str, duration_secs: f64, statuses: &[(&str, usize)]) {
    EXECUTE_BATCHES_TOTAL.inc();
    EXECUTE_DURATION.with_label_values(&[mode]).observe(duration_secs);
    for (status, count) in statuses {
        EXECUTE_ACTION_STATUS_TOTAL.with_label_values(&[status]).inc_by(*count as u64);
    }
}

pub fn observe_rollback(statuses: &[(&str, usize)]) {
    ROLLBACK_BATCHES_TOTAL.inc();
    for (status, count) in statuses {
        ROLLBACK_ACTION_STATUS_TOTAL.with_label_values(&[status]).inc_by(*count as u64);
    }
}

pub fn observe_db_query(operation: &str, duration_secs: f64) {
    DB_QUERY_DURATION.with_label_values(&[operation]).observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_registry() -> Registry {
        let r = Registry::new_custom(Some("t".into()), None).unwrap();
        register_all(&r).unwrap();
        r
    }

    #[test]
    fn http_requests_are_counted() {
        let r = fresh_registry();
        observe_http("GET", "/runs", 200, 0.01);
        observe_http("GET", "/runs", 200, 0.02);
        let out = gather_metrics(&r);
        assert!(out.contains("http_requests_total"));
    }

    #[test]
    fn scan_findings_recorded_per_type() {
        let r = fresh_registry();
        observe_scan("ok", 1.2, &[("change_storage_class", 3), ("add_lifecycle_policy", 1)], 0);
        let out = gather_metrics(&r);
        assert!(out.contains("scan_findings_total"));
        assert!(out.contains("change_storage_class"));
    }

    #[test]
    fn execute_action_statuses_recorded() {
        let r = fresh_registry();
        observe_execute("full", 0.5, &[("executed", 2), ("blocked", 1)]);
        let out = gather_metrics(&r);
        assert!(out.contains("execute_action_status_total"));
        assert!(out.contains("blocked"));
    }

    #[test]
    fn gather_returns_valid_prometheus_format() {
        let r = fresh_registry();
        SCAN_RUNS_TOTAL.inc();
        let out = gather_metrics(&r);
        assert!(out.contains("# HELP"));
        assert!(out.contains("# TYPE"));
    }
}
