//! Validator Phase Metrics

use crate::domain::RejectReason;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for validation and normalization of rows
pub struct ValidatorMetrics;

impl ValidatorMetrics {
    pub fn record_accepted(count: u64) {
        if count > 0 {
            ::metrics::counter!(phase_metric!(counter, "validator", "rows_accepted")).increment(count);
        }
    }

    pub fn record_rejected(reason: RejectReason) {
        ::metrics::counter!(phase_metric!(counter, "validator", "rows_rejected"), "reason" => reason.code())
            .increment(1);
    }

    /// Keys seeded into a run's reference set.
    pub fn record_reference_keys(count: usize) {
        ::metrics::histogram!(phase_metric!(histogram, "validator", "reference_keys"))
            .record(count as f64);
    }
}

impl PhaseMetrics for ValidatorMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "validator", "rows_accepted"));
        let _ = counter!(phase_metric!(counter, "validator", "rows_rejected"));
        let _ = histogram!(phase_metric!(histogram, "validator", "reference_keys"));
    }

    fn phase_name() -> &'static str {
        "validator"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "validator", "rows_accepted"),
                metric_type: MetricType::Counter,
                help: "Rows accepted and normalized into canonical records",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validator", "rows_rejected"),
                metric_type: MetricType::Counter,
                help: "Rows excluded from the snapshot, by rejection reason",
                labels: vec!["reason"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "validator", "reference_keys"),
                metric_type: MetricType::Histogram,
                help: "Size of the accepted-key set seeded by the reference phase",
                labels: vec![],
            },
        ]
    }
}
