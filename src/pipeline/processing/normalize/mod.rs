//! Conversion of accepted raw rows into canonical typed records.

pub mod code_tables;

use bigdecimal::{BigDecimal, RoundingMode};
use thiserror::Error;

use crate::domain::{CanonicalRecord, RawRow, RejectReason, Value};
use crate::pipeline::processing::parse::{parse_date, parse_decimal, parse_int, parse_rate};
use crate::registry::{FieldDef, FieldType, Schema};
use crate::tenant::TenantNamespace;

/// Fixed scale of monetary amounts
pub const DECIMAL_SCALE: i64 = 2;
/// Fixed scale of rates stored as fractions
pub const RATE_SCALE: i64 = 6;

/// Why an accepted row could not be converted. Always a row-level problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("value '{value}' of field '{field}' is not in its code table")]
    UnmappedCategory { field: String, value: String },

    #[error("value '{value}' of field '{field}' cannot be converted")]
    Unparseable { field: String, value: String },

    #[error("field '{field}' references unknown code table '{table}'")]
    UnknownCodeTable { field: String, table: String },
}

impl NormalizeError {
    /// Rejection reason the failed row is counted under.
    pub fn reason(&self) -> RejectReason {
        match self {
            NormalizeError::UnmappedCategory { .. } | NormalizeError::UnknownCodeTable { .. } => {
                RejectReason::UnmappedCategory
            }
            NormalizeError::Unparseable { .. } => RejectReason::InvalidType,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            NormalizeError::UnmappedCategory { field, .. }
            | NormalizeError::Unparseable { field, .. }
            | NormalizeError::UnknownCodeTable { field, .. } => field,
        }
    }
}

/// Stateless, deterministic normalizer: the same row and schema always give the same
/// record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        row: &RawRow,
        schema: &Schema,
        namespace: &TenantNamespace,
    ) -> Result<CanonicalRecord, NormalizeError> {
        let mut fields = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = match row.value(&field.name) {
                Some(raw) => normalize_value(field, raw)?,
                None => Value::Null,
            };
            fields.push((field.name.clone(), value));
        }
        Ok(CanonicalRecord {
            tenant_id: namespace.tenant_code().to_string(),
            fields,
        })
    }
}

fn normalize_value(field: &FieldDef, raw: &str) -> Result<Value, NormalizeError> {
    let unparseable = || NormalizeError::Unparseable {
        field: field.name.clone(),
        value: raw.to_string(),
    };

    let value = match field.field_type {
        FieldType::Int => Value::Int(parse_int(raw).ok_or_else(unparseable)?),
        FieldType::Decimal => {
            Value::Decimal(rescale(parse_decimal(raw).ok_or_else(unparseable)?, DECIMAL_SCALE))
        }
        FieldType::Rate => Value::Rate(rescale(parse_rate(raw).ok_or_else(unparseable)?, RATE_SCALE)),
        FieldType::Date => Value::Date(parse_date(raw).ok_or_else(unparseable)?),
        FieldType::String => Value::Text(raw.trim().to_string()),
        FieldType::Enum => {
            let table_name = field.code_table.as_deref().unwrap_or_default();
            let table = code_tables::lookup_table(table_name).ok_or_else(|| {
                NormalizeError::UnknownCodeTable {
                    field: field.name.clone(),
                    table: table_name.to_string(),
                }
            })?;
            let code = table
                .map(raw)
                .ok_or_else(|| NormalizeError::UnmappedCategory {
                    field: field.name.clone(),
                    value: raw.trim().to_string(),
                })?;
            Value::Code(code.to_string())
        }
    };
    Ok(value)
}

fn rescale(value: BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfEven)
}
