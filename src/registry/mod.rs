//! Schema registry: maps a (loan_type, dataset_type) pair to its field schema.
//!
//! Schemas are loaded once at startup and shared read-only; lookups never mutate state.

pub mod builtin;
pub mod schema;
pub mod schema_loader;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::common::error::{RegistryError, SyncError};
use crate::domain::DatasetKind;

pub use schema::{FieldDef, FieldType, Schema, SchemaBuilder};

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<DatasetKind, Arc<Schema>>,
}

impl SchemaRegistry {
    /// An empty registry; callers register their own schemas.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in CREDIT and PAYMENT_PLAN schemas.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::empty();
        for schema in builtin::builtin_schemas()? {
            registry.register(schema);
        }
        Ok(registry)
    }

    /// Built-in schemas overlaid with every JSON schema found in `schema_dir`.
    pub fn with_schema_dir<P: AsRef<Path>>(schema_dir: P) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin()?;
        for schema in schema_loader::load_from_directory(&schema_dir)? {
            info!(kind = %schema.kind, "Loaded schema from {}", schema_dir.as_ref().display());
            registry.register(schema);
        }
        Ok(registry)
    }

    /// Register (or replace) the schema for its dataset kind.
    pub fn register(&mut self, schema: Schema) {
        debug!(kind = %schema.kind, fields = schema.fields.len(), "Registering schema");
        self.schemas.insert(schema.kind.clone(), Arc::new(schema));
    }

    pub fn resolve(&self, loan_type: &str, dataset_type: &str) -> Result<Arc<Schema>, SyncError> {
        let kind = DatasetKind::new(loan_type, dataset_type);
        self.schemas
            .get(&kind)
            .cloned()
            .ok_or(SyncError::UnknownDatasetKind {
                loan_type: kind.loan_type,
                dataset_type: kind.dataset_type,
            })
    }

    pub fn kinds(&self) -> Vec<&DatasetKind> {
        self.schemas.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
