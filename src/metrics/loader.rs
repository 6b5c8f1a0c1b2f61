//! Loader Phase Metrics
//!
//! Staging writes and snapshot swaps against the warehouse.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the warehouse Loader phase
pub struct LoaderMetrics;

impl LoaderMetrics {
    pub fn record_append(records: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "loader", "records_staged")).increment(records as u64);
        ::metrics::histogram!(phase_metric!(histogram, "loader", "append_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_commit(records: u64) {
        ::metrics::counter!(phase_metric!(counter, "loader", "swaps")).increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "loader", "snapshot_records")).set(records as f64);
    }

    pub fn record_abort() {
        ::metrics::counter!(phase_metric!(counter, "loader", "aborts")).increment(1);
    }

    pub fn record_write_error() {
        ::metrics::counter!(phase_metric!(counter, "loader", "write_errors")).increment(1);
    }
}

impl PhaseMetrics for LoaderMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "loader", "records_staged"));
        let _ = counter!(phase_metric!(counter, "loader", "swaps"));
        let _ = counter!(phase_metric!(counter, "loader", "aborts"));
        let _ = counter!(phase_metric!(counter, "loader", "write_errors"));
        let _ = histogram!(phase_metric!(histogram, "loader", "append_duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "loader", "snapshot_records"));
    }

    fn phase_name() -> &'static str {
        "loader"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "loader", "records_staged"),
                metric_type: MetricType::Counter,
                help: "Canonical records written to staging areas",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "swaps"),
                metric_type: MetricType::Counter,
                help: "Snapshots replaced by a committed staging area",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "aborts"),
                metric_type: MetricType::Counter,
                help: "Staging areas discarded after a failed run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "write_errors"),
                metric_type: MetricType::Counter,
                help: "Warehouse writes that failed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "loader", "append_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent appending one batch to staging",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "loader", "snapshot_records"),
                metric_type: MetricType::Gauge,
                help: "Record count of the most recently swapped snapshot",
                labels: vec![],
            },
        ]
    }
}
