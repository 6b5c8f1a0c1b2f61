//! Reader Phase Metrics
//!
//! Batches and rows pulled from CSV sources, plus rows the reader could not split.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the Reader phase
pub struct ReaderMetrics;

impl ReaderMetrics {
    pub fn record_batch(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "reader", "batches")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "reader", "rows")).increment(rows as u64);
        ::metrics::histogram!(phase_metric!(histogram, "reader", "batch_rows")).record(rows as f64);
    }

    pub fn record_malformed_rows(count: usize) {
        if count > 0 {
            ::metrics::counter!(phase_metric!(counter, "reader", "malformed_rows"))
                .increment(count as u64);
        }
    }

    pub fn record_source_error(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "reader", "source_errors"), "kind" => kind)
            .increment(1);
    }
}

impl PhaseMetrics for ReaderMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "reader", "batches"));
        let _ = counter!(phase_metric!(counter, "reader", "rows"));
        let _ = counter!(phase_metric!(counter, "reader", "malformed_rows"));
        let _ = counter!(phase_metric!(counter, "reader", "source_errors"));
        let _ = histogram!(phase_metric!(histogram, "reader", "batch_rows"));
    }

    fn phase_name() -> &'static str {
        "reader"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "reader", "batches"),
                metric_type: MetricType::Counter,
                help: "Total number of row batches read from sources",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "reader", "rows"),
                metric_type: MetricType::Counter,
                help: "Total number of data rows read, malformed rows included",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "reader", "malformed_rows"),
                metric_type: MetricType::Counter,
                help: "Rows whose column count or encoding did not match the header",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "reader", "source_errors"),
                metric_type: MetricType::Counter,
                help: "Sources that could not be opened or read",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "reader", "batch_rows"),
                metric_type: MetricType::Histogram,
                help: "Rows per batch",
                labels: vec![],
            },
        ]
    }
}
