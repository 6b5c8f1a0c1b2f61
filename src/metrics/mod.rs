//! Centralized metrics infrastructure for the loan sync pipeline
//!
//! Each pipeline phase defines its own metrics in a dedicated submodule, so names stay
//! consistent and conflicts surface at registration time.

pub mod loader;
pub mod reader;
pub mod registry;
pub mod sync;
pub mod validator;

pub use loader::LoaderMetrics;
pub use reader::ReaderMetrics;
pub use sync::SyncMetrics;
pub use validator::ValidatorMetrics;

use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

/// Environment variable holding the Prometheus listen address
pub const METRICS_ADDR_ENV: &str = "LOAN_SYNC_METRICS_ADDR";

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the global metrics infrastructure
///
/// Idempotent. Installs a Prometheus recorder, then registers all phase metrics. When
/// `LOAN_SYNC_METRICS_ADDR` is set the HTTP exporter is spawned on the current tokio
/// runtime, so call this from inside one. Without a recorder the `metrics` macros are
/// no-ops, so library callers never have to call this.
pub fn init_metrics() {
    INIT.call_once(|| {
        let installed = match listen_addr() {
            Some(addr) => install_with_listener(addr),
            None => metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| e.to_string()),
        };

        match installed {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: handle was already stored");
                }
                registry::register_all_metrics();
                info!("All pipeline metrics registered successfully");
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

fn listen_addr() -> Option<SocketAddr> {
    let addr_str = std::env::var(METRICS_ADDR_ENV).ok()?;
    match addr_str.trim().parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            warn!("Invalid metrics addr '{}', exporter disabled", addr_str);
            None
        }
    }
}

/// Build the recorder and its HTTP exporter, register the recorder globally and run the
/// exporter as a task on the current runtime.
fn install_with_listener(addr: SocketAddr) -> Result<PrometheusHandle, String> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| format!("no tokio runtime to serve metrics on {}", addr))?;
    let (recorder, exporter) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| e.to_string())?;
    let handle = recorder.handle();
    if ::metrics::set_global_recorder(recorder).is_err() {
        return Err("a metrics recorder is already installed".to_string());
    }

    runtime.spawn(async move {
        if exporter.await.is_err() {
            warn!("Prometheus HTTP exporter stopped");
        }
    });
    info!("Prometheus HTTP exporter listening at http://{}/metrics", addr);
    Ok(handle)
}

/// Render the current metrics in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Macro to create phase-specific metric names with consistent naming
///
/// loan_sync_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("loan_sync_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("loan_sync_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("loan_sync_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
