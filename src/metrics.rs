// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the clusterdomain controller.
//!
//! This module provides metrics collection with the namespace prefix
//! `clusterdomain_firestoned_io_` (prometheus-safe version of "clusterdomain.firestoned.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Track reconcile handlers and their outcomes
//! - **Directory Metrics** - Track requests to the managed DNS directory and rate limiting
//! - **Daemon Metrics** - Track renew-and-sync cycles
//! - **Certificate Metrics** - Track ACME certificate issuance
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterdomain::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("Ingress", std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all clusterdomain metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "clusterdomain_firestoned_io";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Metric definitions are static, so construction and registration only fail on a
// programming error (bad name or duplicate registration).
fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)
        .expect("valid counter definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

fn histogram_vec(name: &str, help: &str, labels: &[&str], buckets: Vec<f64>) -> HistogramVec {
    let opts = HistogramOpts::new(format!("{METRICS_NAMESPACE}_{name}"), help).buckets(buckets);
    let histogram = HistogramVec::new(opts, labels).expect("valid histogram definition");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("histogram registered once");
    histogram
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations
///
/// Labels:
/// - `resource_type`: Kind of object reconciled (`ConfigMap`, `Ingress`, `Secret`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

/// Duration of reconciliations in seconds, by `resource_type`
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram_vec(
        "reconciliation_duration_seconds",
        "Duration of reconciliations in seconds by resource type",
        &["resource_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0],
    )
});

/// Total number of requeues
///
/// Labels:
/// - `resource_type`: Kind of object
/// - `reason`: `error`, `issuance_in_progress`
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

// ============================================================================
// Directory Metrics
// ============================================================================

/// Total number of DNS directory requests
///
/// Labels:
/// - `operation`: `reserve_domain`, `create_record`, `renew`, `delete_record`, `purge_records`
/// - `outcome`: `success`, `error`
pub static DIRECTORY_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "directory_requests_total",
        "Total number of DNS directory requests by operation and outcome",
        &["operation", "outcome"],
    )
});

pub static DIRECTORY_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram_vec(
        "directory_request_duration_seconds",
        "Duration of DNS directory requests in seconds by operation",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
    )
});

/// HTTP 429 responses from the DNS directory, by `class`
/// (`authenticated`, `unauthenticated`)
pub static RATE_LIMIT_HITS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "rate_limit_hits_total",
        "Total number of rate-limit responses from the DNS directory by request class",
        &["class"],
    )
});

// ============================================================================
// Daemon and Certificate Metrics
// ============================================================================

/// Renew-and-sync cycles, by `outcome` (`success`, `retry`, `exhausted`, `cancelled`)
pub static DAEMON_CYCLES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "daemon_cycles_total",
        "Total number of DNS renew-and-sync cycles by outcome",
        &["outcome"],
    )
});

/// ACME certificate issuances
///
/// Labels:
/// - `challenge`: `dns-01`, `http-01`
/// - `outcome`: `success`, `error`
pub static CERTIFICATE_ISSUANCES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "certificate_issuances_total",
        "Total number of ACME certificate issuances by challenge type and outcome",
        &["challenge", "outcome"],
    )
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of object reconciled (e.g., `Ingress`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of object reconciled
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a requeue
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record a DNS directory request
pub fn record_directory_request(operation: &str, outcome: &str, duration: Duration) {
    DIRECTORY_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    DIRECTORY_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Record an HTTP 429 from the DNS directory
pub fn record_rate_limit_hit(class: &str) {
    RATE_LIMIT_HITS_TOTAL.with_label_values(&[class]).inc();
}

/// Record the outcome of a renew-and-sync cycle
pub fn record_daemon_cycle(outcome: &str) {
    DAEMON_CYCLES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record the outcome of a certificate issuance
pub fn record_certificate_issuance(challenge: &str, outcome: &str) {
    CERTIFICATE_ISSUANCES_TOTAL
        .with_label_values(&[challenge, outcome])
        .inc();
}

/// Gather all metrics and encode them in Prometheus text format
///
/// # Errors
///
/// Returns error if metrics encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
