//! Row validation against a dataset schema.
//!
//! Fields are checked in schema order and the first failure decides the outcome. Once
//! every field passes, a dataset that references another dataset must point at a key
//! already accepted in the same run. A key counts as accepted only after the caller
//! confirms the row also normalized.

use std::collections::HashSet;

use bigdecimal::BigDecimal;
use tracing::debug;

use crate::domain::{RawRow, RejectReason, ValidationOutcome};
use crate::pipeline::processing::parse::{parse_date, parse_decimal, parse_int, parse_rate};
use crate::registry::{FieldDef, FieldType, Schema};

struct FieldFailure {
    reason: RejectReason,
    message: String,
}

/// Validator for one sync run. Owns the run's accepted-key set.
#[derive(Debug, Default)]
pub struct Validator {
    accepted_keys: HashSet<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with keys accepted earlier in the same run (the reference phase).
    pub fn seeded(keys: HashSet<String>) -> Self {
        Self {
            accepted_keys: keys,
        }
    }

    pub fn accepted_keys(&self) -> &HashSet<String> {
        &self.accepted_keys
    }

    pub fn into_accepted_keys(self) -> HashSet<String> {
        self.accepted_keys
    }

    /// Record the key of an accepted row once it has also normalized. Rows of a
    /// referencing dataset never add keys.
    pub fn confirm(&mut self, row: &RawRow, schema: &Schema) {
        if schema.reference.is_some() {
            return;
        }
        if let Some(key) = row.value(&schema.key_field) {
            self.accepted_keys.insert(key.to_string());
        }
    }

    pub fn validate(&mut self, row: RawRow, schema: &Schema) -> ValidationOutcome {
        for field in &schema.fields {
            if let Err(failure) = check_field(field, row.value(&field.name)) {
                debug!(
                    row = row.row_number,
                    field = %field.name,
                    reason = %failure.reason,
                    "Row rejected"
                );
                return ValidationOutcome::Rejected {
                    row,
                    reason: failure.reason,
                    field: Some(field.name.clone()),
                    message: failure.message,
                };
            }
        }

        let key = row.value(&schema.key_field).map(str::to_string);
        match (&schema.reference, key) {
            (Some(reference), Some(key)) if !self.accepted_keys.contains(&key) => {
                debug!(row = row.row_number, key = %key, "Row references unknown key");
                ValidationOutcome::Rejected {
                    row,
                    reason: RejectReason::OrphanReference,
                    field: Some(schema.key_field.clone()),
                    message: format!(
                        "{} '{}' has no accepted {} row in this run",
                        schema.key_field, key, reference
                    ),
                }
            }
            (Some(_), None) => ValidationOutcome::Rejected {
                row,
                reason: RejectReason::OrphanReference,
                field: Some(schema.key_field.clone()),
                message: format!("{} is empty", schema.key_field),
            },
            (Some(_), Some(_)) | (None, _) => ValidationOutcome::Accepted(row),
        }
    }
}

fn check_field(field: &FieldDef, value: Option<&str>) -> Result<(), FieldFailure> {
    let raw = match value {
        Some(raw) => raw,
        None if field.required => {
            return Err(FieldFailure {
                reason: RejectReason::MissingRequired,
                message: format!("required field '{}' is empty", field.name),
            })
        }
        None => return Ok(()),
    };

    let invalid = |expected: &str| FieldFailure {
        reason: RejectReason::InvalidType,
        message: format!("'{}' is not a valid {}", raw, expected),
    };

    match field.field_type {
        FieldType::Int => {
            let parsed = parse_int(raw).ok_or_else(|| invalid("integer"))?;
            check_range(field, &BigDecimal::from(parsed), raw)
        }
        FieldType::Decimal => {
            let parsed = parse_decimal(raw).ok_or_else(|| invalid("decimal"))?;
            check_range(field, &parsed, raw)
        }
        FieldType::Rate => {
            let parsed = parse_rate(raw).ok_or_else(|| invalid("rate"))?;
            check_range(field, &parsed, raw)
        }
        FieldType::Date => parse_date(raw).map(|_| ()).ok_or_else(|| invalid("date")),
        FieldType::String => Ok(()),
        FieldType::Enum => match &field.allowed {
            Some(allowed)
                if !allowed
                    .iter()
                    .any(|a| a.trim().to_lowercase() == raw.to_lowercase()) =>
            {
                Err(FieldFailure {
                    reason: RejectReason::OutOfRange,
                    message: format!("'{}' is not one of {}", raw, allowed.join(", ")),
                })
            }
            _ => Ok(()),
        },
    }
}

fn check_range(field: &FieldDef, value: &BigDecimal, raw: &str) -> Result<(), FieldFailure> {
    if let Some(min) = &field.min {
        if value < min {
            return Err(FieldFailure {
                reason: RejectReason::OutOfRange,
                message: format!("'{}' is below minimum {}", raw, min),
            });
        }
    }
    if let Some(max) = &field.max {
        if value > max {
            return Err(FieldFailure {
                reason: RejectReason::OutOfRange,
                message: format!("'{}' is above maximum {}", raw, max),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn credit_schema() -> Schema {
        Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .field(FieldDef::new("rate", FieldType::Rate).required().min(0).max(1))
            .field(FieldDef::new("origination_date", FieldType::Date).required())
            .field(
                FieldDef::new("status", FieldType::Enum)
                    .code_table("loan_status")
                    .allowed(&["A", "K", "G"]),
            )
            .build()
            .unwrap()
    }

    fn plan_schema() -> Schema {
        Schema::builder("RETAIL", "PAYMENT_PLAN")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .field(FieldDef::new("installment_amount", FieldType::Decimal).min(0))
            .references("CREDIT")
            .build()
            .unwrap()
    }

    fn row(number: u64, pairs: &[(&str, &str)]) -> RawRow {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRow::new(number, values)
    }

    fn reason_of(outcome: &ValidationOutcome) -> Option<(RejectReason, Option<String>)> {
        match outcome {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected { reason, field, .. } => Some((*reason, field.clone())),
        }
    }

    #[test]
    fn test_scenario_rows_classified() {
        let schema = credit_schema();
        let mut validator = Validator::new();

        let ok = validator.validate(
            row(1, &[("loan_id", "1"), ("rate", "0.05"), ("origination_date", "2024-01-01")]),
            &schema,
        );
        assert!(validator.accepted_keys().is_empty());
        match ok {
            ValidationOutcome::Accepted(row) => validator.confirm(&row, &schema),
            other => panic!("expected acceptance, got {:?}", other),
        }

        let high = validator.validate(
            row(2, &[("loan_id", "2"), ("rate", "1.5"), ("origination_date", "2024-01-01")]),
            &schema,
        );
        assert_eq!(
            reason_of(&high),
            Some((RejectReason::OutOfRange, Some("rate".to_string())))
        );

        let missing = validator.validate(row(3, &[("loan_id", "3"), ("origination_date", "2024-01-01")]), &schema);
        assert_eq!(
            reason_of(&missing),
            Some((RejectReason::MissingRequired, Some("rate".to_string())))
        );

        assert!(validator.accepted_keys().contains("1"));
        assert_eq!(validator.accepted_keys().len(), 1);
    }

    #[test]
    fn test_first_failing_field_wins() {
        let mut validator = Validator::new();
        let outcome = validator.validate(
            row(1, &[("loan_id", "abc"), ("rate", "7"), ("origination_date", "")]),
            &credit_schema(),
        );
        assert_eq!(
            reason_of(&outcome),
            Some((RejectReason::InvalidType, Some("loan_id".to_string())))
        );
    }

    #[test]
    fn test_invalid_types_and_enum_membership() {
        let schema = credit_schema();
        let mut validator = Validator::new();

        let bad_date = validator.validate(
            row(1, &[("loan_id", "1"), ("rate", "0.1"), ("origination_date", "2024-13-01")]),
            &schema,
        );
        assert_eq!(reason_of(&bad_date).map(|r| r.0), Some(RejectReason::InvalidType));

        let fractional_id = validator.validate(
            row(2, &[("loan_id", "1.5"), ("rate", "0.1"), ("origination_date", "2024-01-01")]),
            &schema,
        );
        assert_eq!(reason_of(&fractional_id).map(|r| r.0), Some(RejectReason::InvalidType));

        let lower_case_enum = validator.validate(
            row(
                3,
                &[("loan_id", "3"), ("rate", "0.1"), ("origination_date", "2024-01-01"), ("status", "a")],
            ),
            &schema,
        );
        assert!(lower_case_enum.is_accepted());

        let unknown_enum = validator.validate(
            row(
                4,
                &[("loan_id", "4"), ("rate", "0.1"), ("origination_date", "2024-01-01"), ("status", "X")],
            ),
            &schema,
        );
        assert_eq!(
            reason_of(&unknown_enum),
            Some((RejectReason::OutOfRange, Some("status".to_string())))
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let schema = credit_schema();
        let mut validator = Validator::new();
        for (n, rate) in [(1, "0"), (2, "1"), (3, "100%")] {
            let outcome = validator.validate(
                row(n, &[("loan_id", "9"), ("rate", rate), ("origination_date", "2024-01-01")]),
                &schema,
            );
            assert!(outcome.is_accepted(), "rate {} should be accepted", rate);
        }
        let negative = validator.validate(
            row(4, &[("loan_id", "9"), ("rate", "-0.01"), ("origination_date", "2024-01-01")]),
            &schema,
        );
        assert_eq!(reason_of(&negative).map(|r| r.0), Some(RejectReason::OutOfRange));
    }

    #[test]
    fn test_orphan_reference_against_seeded_keys() {
        let schema = plan_schema();
        let mut validator = Validator::seeded(["1".to_string()].into_iter().collect());

        let known = validator.validate(row(1, &[("loan_id", "1"), ("installment_amount", "100")]), &schema);
        assert!(known.is_accepted());

        let orphan = validator.validate(row(2, &[("loan_id", "99"), ("installment_amount", "100")]), &schema);
        assert_eq!(
            reason_of(&orphan),
            Some((RejectReason::OrphanReference, Some("loan_id".to_string())))
        );

        // field failures take precedence over the orphan check
        let negative = validator.validate(row(3, &[("loan_id", "99"), ("installment_amount", "-1")]), &schema);
        assert_eq!(reason_of(&negative).map(|r| r.0), Some(RejectReason::OutOfRange));

        // referencing datasets never add keys
        if let ValidationOutcome::Accepted(row) = known {
            validator.confirm(&row, &schema);
        }
        assert_eq!(validator.into_accepted_keys().len(), 1);
    }
}
