use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::schema::{FieldDef, Schema};
use crate::common::error::RegistryError;

/// On-disk JSON layout of a schema definition
#[derive(Debug, Deserialize)]
pub struct SchemaFile {
    pub loan_type: String,
    pub dataset_type: String,
    pub key_field: Option<String>,
    pub references: Option<String>,
    pub target_table: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl SchemaFile {
    pub fn into_schema(self) -> Result<Schema, RegistryError> {
        let mut builder = Schema::builder(&self.loan_type, &self.dataset_type).fields(self.fields);
        if let Some(key) = self.key_field.as_deref() {
            builder = builder.key_field(key);
        }
        if let Some(reference) = self.references.as_deref() {
            builder = builder.references(reference);
        }
        if let Some(table) = self.target_table.as_deref() {
            builder = builder.target_table(table);
        }
        builder.build()
    }
}

/// Load all `*.json` schema definitions from a directory, sorted by file name.
pub fn load_from_directory<P: AsRef<Path>>(schema_dir: P) -> Result<Vec<Schema>, RegistryError> {
    let dir_path = schema_dir.as_ref();
    let io_err = |source| RegistryError::Io {
        path: dir_path.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir_path).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut schemas = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        let file: SchemaFile = serde_json::from_str(&content).map_err(|source| RegistryError::Json {
            path: path.clone(),
            source,
        })?;
        schemas.push(file.into_schema()?);
    }

    Ok(schemas)
}
