//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers every phase's metrics and reports naming conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let all_metrics = collect_documentation(true);
    info!("Registered {} total metrics across all phases", all_metrics.len());

    if std::env::var("LOAN_SYNC_METRICS_DEBUG").is_ok() {
        let mut names: Vec<_> = all_metrics.values().collect();
        names.sort_by_key(|doc| doc.name);
        for doc in names {
            debug!("  - {} ({:?}): {}", doc.name, doc.metric_type, doc.help);
        }
    }
}

/// Documentation of every metric, keyed by name.
pub fn all_metric_docs() -> HashMap<String, MetricDoc> {
    collect_documentation(false)
}

fn collect_documentation(register: bool) -> HashMap<String, MetricDoc> {
    let mut all_metrics = HashMap::new();
    add_phase::<super::reader::ReaderMetrics>(&mut all_metrics, register);
    add_phase::<super::validator::ValidatorMetrics>(&mut all_metrics, register);
    add_phase::<super::loader::LoaderMetrics>(&mut all_metrics, register);
    add_phase::<super::sync::SyncMetrics>(&mut all_metrics, register);
    all_metrics
}

fn add_phase<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>, register: bool) {
    if register {
        T::register_metrics();
    }
    let phase_name = T::phase_name();
    for doc in T::metrics_documentation() {
        if let Some(existing) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is defined twice (current phase '{}', first: {})",
                doc.name, phase_name, existing.help
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}
