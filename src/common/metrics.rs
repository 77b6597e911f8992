use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::common::error::AuthcError;

/// Initialize the metrics system with a Prometheus exporter.
///
/// Installing the recorder is the host's decision; the engine records
/// through the `metrics` facade either way.
pub fn init_metrics() -> Result<PrometheusHandle, AuthcError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("authc_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )
        .map_err(|e| AuthcError::configuration(format!("Failed to set metric buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| {
            AuthcError::configuration(format!("Failed to install metrics recorder: {}", e))
        })
}

/// Record the outcome and duration of one authentication submission.
pub fn record_authc_attempt(status: &str, duration: Duration) {
    counter!("authc_attempts_total", "status" => status.to_string()).increment(1);
    histogram!("authc_duration_seconds").record(duration.as_secs_f64());
}

/// Record an account lock escalation.
pub fn record_account_lock() {
    counter!("authc_account_locks_total").increment(1);
}
