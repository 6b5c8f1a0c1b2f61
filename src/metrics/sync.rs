//! Sync Phase Metrics
//!
//! One observation per sync run: outcome, duration and refused starts.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for whole sync runs
pub struct SyncMetrics;

impl SyncMetrics {
    pub fn record_run_started() {
        ::metrics::counter!(phase_metric!(counter, "sync", "runs_started")).increment(1);
    }

    pub fn record_run_succeeded(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "sync", "runs_succeeded")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "sync", "duration_seconds")).record(duration_secs);
    }

    pub fn record_run_failed(error_kind: &'static str, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "sync", "runs_failed"), "error" => error_kind)
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "sync", "duration_seconds")).record(duration_secs);
    }

    pub fn record_refused(error_kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "sync", "runs_refused"), "error" => error_kind)
            .increment(1);
    }
}

impl PhaseMetrics for SyncMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "sync", "runs_started"));
        let _ = counter!(phase_metric!(counter, "sync", "runs_succeeded"));
        let _ = counter!(phase_metric!(counter, "sync", "runs_failed"));
        let _ = counter!(phase_metric!(counter, "sync", "runs_refused"));
        let _ = histogram!(phase_metric!(histogram, "sync", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "sync"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "sync", "runs_started"),
                metric_type: MetricType::Counter,
                help: "Sync runs that acquired their key and got a run id",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "sync", "runs_succeeded"),
                metric_type: MetricType::Counter,
                help: "Sync runs that committed a new snapshot",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "sync", "runs_failed"),
                metric_type: MetricType::Counter,
                help: "Sync runs that ended on an infrastructure error",
                labels: vec!["error"],
            },
            MetricDoc {
                name: phase_metric!(counter, "sync", "runs_refused"),
                metric_type: MetricType::Counter,
                help: "Sync requests refused before a run started",
                labels: vec!["error"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "sync", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall-clock duration of a sync run",
                labels: vec![],
            },
        ]
    }
}
