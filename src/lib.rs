pub mod common;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod tenant;

// Domain data shapes shared across layers
pub mod domain;

pub use common::error::{SyncError, WarehouseError};
pub use config::Config;
pub use pipeline::SyncOrchestrator;
