//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `mcp_operator_reconciliations_total{kind}` - Reconcile passes started
//! - `mcp_operator_reconciliation_errors_total{kind,class}` - Failed passes by error class
//! - `mcp_operator_reconciliation_duration_seconds{kind}` - Duration of reconcile passes
//! - `mcp_operator_requeues_total{reason}` - Scheduling directives returned
//! - `mcp_operator_status_writes_total{kind}` - Status subresource writes
//! - `mcp_operator_child_operations_total{kind,action}` - Child creates and updates
//! - `mcp_operator_fanout_failures_total` - Annotation fan-out targets that failed

use anyhow::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mcp_operator_reconciliations_total", "Total number of reconciliations"),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mcp_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind", "class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mcp_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mcp_operator_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static STATUS_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mcp_operator_status_writes_total", "Total number of status writes"),
        &["kind"],
    )
    .expect("Failed to create STATUS_WRITES_TOTAL metric - this should never happen")
});

static CHILD_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mcp_operator_child_operations_total",
            "Total number of child object creates and updates",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create CHILD_OPERATIONS_TOTAL metric - this should never happen")
});

static FANOUT_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mcp_operator_fanout_failures_total",
        "Total number of annotation fan-out targets that could not be updated",
    )
    .expect("Failed to create FANOUT_FAILURES_TOTAL metric - this should never happen")
});

/// Register every metric with [`REGISTRY`]. Call once at startup.
///
/// # Errors
///
/// Fails when a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILD_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FANOUT_FAILURES_TOTAL.clone()))?;

    Ok(())
}

/// Text exposition of everything in [`REGISTRY`]
///
/// # Errors
///
/// Encoding failures.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, class: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, class])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_status_writes(kind: &str) {
    STATUS_WRITES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_child_operations(kind: &str, action: &str) {
    CHILD_OPERATIONS_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

pub fn increment_fanout_failures(count: usize) {
    FANOUT_FAILURES_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}
