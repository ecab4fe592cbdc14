//! Prometheus metrics for the Loft services.
//!
//! Counters are process-wide. The daemon registers them once at startup and
//! can dump them with [`render`].

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static UPLOADS_REQUESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "loft_uploads_requested_total",
        "Total number of write tokens issued",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "loft_uploads_completed_total",
        "Total number of uploads promoted to permanent blocks",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("loft_uploads_failed_total", "Total number of failed uploads by reason"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static TEMP_FILES_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "loft_temp_files_swept_total",
        "Total number of abandoned temp files reclaimed by the sweeper",
    )
    .expect("metric creation failed")
});

// Signup metrics
pub static SIGNUPS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("loft_signups_total", "Total number of completed signups")
        .expect("metric creation failed")
});

pub static SIGNUP_COMPENSATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "loft_signup_compensations_total",
        "Total number of signups rolled back after a partial failure",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedders may call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_REQUESTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TEMP_FILES_SWEPT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNUPS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNUP_COMPENSATIONS.clone()))
            .expect("metric registration failed");
    });
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record upload failures by reason.
pub fn record_upload_failure(reason: &str) {
    UPLOADS_FAILED.with_label_values(&[reason]).inc();
}
