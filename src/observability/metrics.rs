//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `random_secret_sweeps_total{kind}` - Total number of reconciliation sweeps
//! - `random_secret_sweep_errors_total{kind}` - Sweeps aborted because listing failed
//! - `random_secret_sweep_duration_seconds{kind}` - Duration of reconciliation sweeps
//! - `random_secret_values_generated_total{path}` - Generated values (`reconcile` or `admission`)
//! - `random_secret_write_failures_total{kind}` - Per-object write failures during sweeps
//! - `random_secret_admission_requests_total{outcome}` - Admission requests by outcome
//! - `random_secret_watch_events_dropped_total{kind,reason}` - Watch events filtered out
//! - `random_secret_is_leader` - 1 while this replica holds the lease

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SWEEPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("random_secret_sweeps_total", "Total number of reconciliation sweeps"),
        &["kind"],
    )
    .expect("Failed to create SWEEPS_TOTAL metric - this should never happen")
});

static SWEEP_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "random_secret_sweep_errors_total",
            "Total number of sweeps aborted because listing failed",
        ),
        &["kind"],
    )
    .expect("Failed to create SWEEP_ERRORS_TOTAL metric - this should never happen")
});

static SWEEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "random_secret_sweep_duration_seconds",
            "Duration of reconciliation sweeps in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create SWEEP_DURATION metric - this should never happen")
});

static VALUES_GENERATED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "random_secret_values_generated_total",
            "Total number of generated values written or patched",
        ),
        &["path"],
    )
    .expect("Failed to create VALUES_GENERATED_TOTAL metric - this should never happen")
});

static WRITE_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "random_secret_write_failures_total",
            "Total number of per-object write failures during sweeps",
        ),
        &["kind"],
    )
    .expect("Failed to create WRITE_FAILURES_TOTAL metric - this should never happen")
});

static ADMISSION_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "random_secret_admission_requests_total",
            "Total number of admission requests by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create ADMISSION_REQUESTS_TOTAL metric - this should never happen")
});

static WATCH_EVENTS_DROPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "random_secret_watch_events_dropped_total",
            "Total number of watch events dropped before triggering a sweep",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create WATCH_EVENTS_DROPPED_TOTAL metric - this should never happen")
});

static IS_LEADER: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "random_secret_is_leader",
        "Whether this replica currently holds the leader lease",
    )
    .expect("Failed to create IS_LEADER metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SWEEPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SWEEP_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SWEEP_DURATION.clone()))?;
    REGISTRY.register(Box::new(VALUES_GENERATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WRITE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSION_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_EVENTS_DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IS_LEADER.clone()))?;

    Ok(())
}

pub fn increment_sweeps(kind: &str) {
    SWEEPS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_sweep_errors(kind: &str) {
    SWEEP_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_sweep_duration(kind: &str, duration: f64) {
    SWEEP_DURATION.with_label_values(&[kind]).observe(duration);
}

pub fn increment_values_generated(path: &str) {
    VALUES_GENERATED_TOTAL.with_label_values(&[path]).inc();
}

pub fn increment_write_failures(kind: &str) {
    WRITE_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_admission_requests(outcome: &str) {
    ADMISSION_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_watch_events_dropped(kind: &str, reason: &str) {
    WATCH_EVENTS_DROPPED_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
}

pub fn set_is_leader(leader: bool) {
    IS_LEADER.set(i64::from(leader));
}
