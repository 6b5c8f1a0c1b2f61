use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::common::constants::{normalize_code, target_table_name, RESERVED_COLUMNS};
use crate::common::error::RegistryError;
use crate::domain::DatasetKind;
use crate::pipeline::processing::normalize::code_tables;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier pattern is valid"));

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Decimal,
    /// Decimal fraction; accepts `5%` and `500bps` spellings
    Rate,
    Date,
    String,
    Enum,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Decimal | FieldType::Rate)
    }
}

/// One column definition in a dataset schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Inclusive lower bound for numeric fields
    #[serde(default)]
    pub min: Option<BigDecimal>,
    /// Inclusive upper bound for numeric fields
    #[serde(default)]
    pub max: Option<BigDecimal>,
    /// Accepted source spellings for enum fields (case-insensitive)
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    /// Code table used to map enum values to canonical codes
    #[serde(default)]
    pub code_table: Option<String>,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            min: None,
            max: None,
            allowed: None,
            code_table: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: impl Into<BigDecimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<BigDecimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn code_table(mut self, table: &str) -> Self {
        self.code_table = Some(table.to_string());
        self
    }

    pub fn has_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Immutable field layout for one dataset kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub kind: DatasetKind,
    /// Field holding the loan identifier
    pub key_field: String,
    /// Dataset type (same loan type) whose accepted keys this dataset must reference
    pub reference: Option<String>,
    /// Warehouse table name for the current snapshot
    pub target_table: String,
    pub fields: Vec<FieldDef>,
}

impl Schema {
    pub fn builder(loan_type: &str, dataset_type: &str) -> SchemaBuilder {
        SchemaBuilder {
            kind: DatasetKind::new(loan_type, dataset_type),
            key_field: None,
            reference: None,
            target_table: None,
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn invalid(&self, message: String) -> RegistryError {
        RegistryError::InvalidSchema {
            kind: self.kind.to_string(),
            message,
        }
    }

    /// Check structural rules: identifiers, reserved and unique names, key field, code tables, bounds.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.fields.is_empty() {
            return Err(self.invalid("schema has no fields".to_string()));
        }
        if !IDENTIFIER.is_match(&self.target_table) {
            return Err(self.invalid(format!("invalid target table name '{}'", self.target_table)));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(self.invalid(format!("field name '{}' is reserved", field.name)));
            }
            if !IDENTIFIER.is_match(&field.name) {
                return Err(self.invalid(format!("invalid field name '{}'", field.name)));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(self.invalid(format!("duplicate field '{}'", field.name)));
            }
            if field.has_range() && !field.field_type.is_numeric() {
                return Err(self.invalid(format!(
                    "field '{}' declares a range but is not numeric",
                    field.name
                )));
            }
            if let (Some(min), Some(max)) = (&field.min, &field.max) {
                if min > max {
                    return Err(self.invalid(format!("field '{}' has min > max", field.name)));
                }
            }
            if field.field_type == FieldType::Enum {
                match field.code_table.as_deref() {
                    Some(table) if code_tables::lookup_table(table).is_some() => {}
                    Some(table) => {
                        return Err(self.invalid(format!(
                            "field '{}' uses unknown code table '{}'",
                            field.name, table
                        )))
                    }
                    None => {
                        return Err(self.invalid(format!(
                            "enum field '{}' has no code table",
                            field.name
                        )))
                    }
                }
            } else if field.allowed.is_some() || field.code_table.is_some() {
                return Err(self.invalid(format!(
                    "field '{}' declares enum constraints but is not an enum",
                    field.name
                )));
            }
        }

        if self.field(&self.key_field).is_none() {
            return Err(self.invalid(format!("key field '{}' is not defined", self.key_field)));
        }
        if self.reference.as_deref() == Some(self.kind.dataset_type.as_str()) {
            return Err(self.invalid("schema cannot reference itself".to_string()));
        }
        Ok(())
    }
}

pub struct SchemaBuilder {
    kind: DatasetKind,
    key_field: Option<String>,
    reference: Option<String>,
    target_table: Option<String>,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    pub fn key_field(mut self, name: &str) -> Self {
        self.key_field = Some(name.to_string());
        self
    }

    pub fn references(mut self, dataset_type: &str) -> Self {
        self.reference = Some(normalize_code(dataset_type));
        self
    }

    pub fn target_table(mut self, table: &str) -> Self {
        self.target_table = Some(table.to_string());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Finish the schema. The key field defaults to the first field and the target
    /// table to the standard name for the dataset kind.
    pub fn build(self) -> Result<Schema, RegistryError> {
        let key_field = self
            .key_field
            .or_else(|| self.fields.first().map(|f| f.name.clone()))
            .unwrap_or_default();
        let target_table = self
            .target_table
            .unwrap_or_else(|| target_table_name(&self.kind.loan_type, &self.kind.dataset_type));
        let schema = Schema {
            kind: self.kind,
            key_field,
            reference: self.reference,
            target_table,
            fields: self.fields,
        };
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("loan_id", FieldType::Int).required(),
            FieldDef::new("rate", FieldType::Rate).required().min(0).max(1),
            FieldDef::new("origination_date", FieldType::Date).required(),
        ]
    }

    #[test]
    fn test_builder_defaults_key_field_and_target_table() {
        let schema = Schema::builder("retail", "credit")
            .fields(scenario_fields())
            .build()
            .unwrap();

        assert_eq!(schema.key_field, "loan_id");
        assert_eq!(schema.target_table, "fact_loans_current_retail");
        assert_eq!(schema.field_names(), vec!["loan_id", "rate", "origination_date"]);
    }

    #[test]
    fn test_rejects_duplicate_and_invalid_field_names() {
        let dup = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int))
            .field(FieldDef::new("loan_id", FieldType::String))
            .build();
        assert!(matches!(dup, Err(RegistryError::InvalidSchema { .. })));

        let bad_name = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("Loan-Id", FieldType::Int))
            .build();
        assert!(bad_name.is_err());
    }

    #[test]
    fn test_rejects_reserved_column_names() {
        for reserved in ["tenant_id", "_row_seq"] {
            let schema = Schema::builder("RETAIL", "CREDIT")
                .fields(scenario_fields())
                .field(FieldDef::new(reserved, FieldType::String))
                .build();
            match schema {
                Err(RegistryError::InvalidSchema { message, .. }) => {
                    assert!(message.contains("reserved"), "{message}")
                }
                other => panic!("expected reserved name error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_enum_without_known_code_table() {
        let missing = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("status", FieldType::Enum))
            .build();
        assert!(missing.is_err());

        let unknown = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("status", FieldType::Enum).code_table("colors"))
            .build();
        assert!(unknown.is_err());
    }

    #[test]
    fn test_rejects_range_on_text_field_and_inverted_bounds() {
        let text_range = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("name", FieldType::String).min(1))
            .build();
        assert!(text_range.is_err());

        let inverted = Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("rate", FieldType::Rate).min(1).max(0))
            .build();
        assert!(inverted.is_err());
    }

    #[test]
    fn test_rejects_unknown_key_field() {
        let schema = Schema::builder("RETAIL", "CREDIT")
            .fields(scenario_fields())
            .key_field("account")
            .build();
        assert!(schema.is_err());
    }
}
