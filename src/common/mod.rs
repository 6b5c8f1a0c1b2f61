// Common constants and error types shared across the pipeline

pub mod constants;
pub mod error;

pub use error::{ConfigError, RegistryError, Result, SourceError, SyncError, WarehouseError};
