use std::path::PathBuf;

use thiserror::Error;

use crate::domain::SyncKey;

/// Errors surfaced by `start_sync` and the snapshot/summary reads.
///
/// Row-level data problems never appear here; they are counted as rejections on the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("no schema registered for {loan_type}/{dataset_type}")]
    UnknownDatasetKind {
        loan_type: String,
        dataset_type: String,
    },

    #[error("sync already in progress for {0}")]
    SyncAlreadyInProgress(SyncKey),

    #[error("source unreadable: {0}")]
    SourceUnreadable(#[from] SourceError),

    #[error("warehouse write failed: {0}")]
    WriteFailure(#[from] WarehouseError),

    #[error("warehouse read failed: {0}")]
    ReadFailure(WarehouseError),
}

impl SyncError {
    /// Stable identifier used in logs, metrics and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::UnknownTenant(_) => "unknown_tenant",
            SyncError::UnknownDatasetKind { .. } => "unknown_dataset_kind",
            SyncError::SyncAlreadyInProgress(_) => "sync_already_in_progress",
            SyncError::SourceUnreadable(_) => "source_unreadable",
            SyncError::WriteFailure(_) => "write_failure",
            SyncError::ReadFailure(_) => "read_failure",
        }
    }

    /// Infrastructure failures may succeed when retried by the caller; configuration and
    /// concurrency errors will not change on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnreadable(_) | SyncError::WriteFailure(_) | SyncError::ReadFailure(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source not found: {location}")]
    NotFound { location: String },

    #[error("failed to open {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read header of {location}: {message}")]
    Header { location: String, message: String },

    #[error("read task for {location} failed: {message}")]
    Task { location: String, message: String },
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("warehouse unreachable: {0}")]
    Unreachable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("record for tenant {found} rejected by staging area of tenant {expected}")]
    TenantMismatch { expected: String, found: String },

    #[error("unknown staging area: {0}")]
    UnknownStaging(String),

    #[error("corrupt value in {table}.{column}: {value}")]
    Corrupt {
        table: String,
        column: String,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid schema {kind}: {message}")]
    InvalidSchema { kind: String, message: String },

    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("schema registry: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
