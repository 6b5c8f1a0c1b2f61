//! Built-in loan portfolio schemas for the external bank extract.
//!
//! CREDIT carries one row per loan account; PAYMENT_PLAN carries one row per installment
//! and must reference a loan account accepted earlier in the same run.

use super::schema::{FieldDef, FieldType, Schema};
use crate::common::constants::{CREDIT, LOAN_TYPES, PAYMENT_PLAN};
use crate::common::error::RegistryError;

const LOAN_KEY: &str = "loan_account_number";

fn text(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::String)
}

fn category(name: &str, table: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Enum).code_table(table)
}

fn count(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Int).min(0)
}

fn amount(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Decimal).min(0)
}

/// Rates are decimal fractions; `5%` and `500bps` normalize into range, a bare `24.5` does not.
fn rate(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Rate).min(0).max(1)
}

fn date(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Date)
}

pub fn credit_fields() -> Vec<FieldDef> {
    vec![
        text(LOAN_KEY).required(),
        category("customer_type", "customer_type"),
        text("customer_id"),
        text("loan_product_type"),
        category("loan_status_code", "loan_status").required(),
        category("loan_status_flag", "loan_status"),
        count("days_past_due"),
        date("final_maturity_date"),
        count("total_installment_count"),
        count("outstanding_installment_count"),
        count("paid_installment_count"),
        date("first_payment_date"),
        amount("original_loan_amount").required(),
        amount("outstanding_principal_balance"),
        rate("nominal_interest_rate"),
        amount("total_interest_amount"),
        rate("kkdf_rate"),
        amount("kkdf_amount"),
        rate("bsmv_rate"),
        amount("bsmv_amount"),
        count("grace_period_months"),
        count("installment_frequency"),
        date("loan_start_date").required(),
        date("loan_closing_date"),
        text("customer_region_code"),
        text("sector_code"),
        text("internal_credit_rating"),
        rate("default_probability"),
        text("risk_class"),
        text("customer_segment"),
        text("internal_rating"),
        text("external_rating"),
        category("insurance_included", "yes_no"),
    ]
}

pub fn payment_plan_fields() -> Vec<FieldDef> {
    vec![
        text(LOAN_KEY).required(),
        count("installment_number").required(),
        date("actual_payment_date"),
        date("scheduled_payment_date").required(),
        amount("installment_amount").required(),
        amount("principal_component"),
        amount("interest_component"),
        amount("kkdf_component"),
        amount("bsmv_component"),
        category("installment_status", "loan_status"),
        amount("remaining_principal"),
        amount("remaining_interest"),
        amount("remaining_kkdf"),
        amount("remaining_bsmv"),
    ]
}

/// CREDIT and PAYMENT_PLAN schemas for every supported loan type.
pub fn builtin_schemas() -> Result<Vec<Schema>, RegistryError> {
    let mut schemas = Vec::new();
    for loan_type in LOAN_TYPES {
        schemas.push(
            Schema::builder(loan_type, CREDIT)
                .key_field(LOAN_KEY)
                .fields(credit_fields())
                .build()?,
        );
        schemas.push(
            Schema::builder(loan_type, PAYMENT_PLAN)
                .key_field(LOAN_KEY)
                .references(CREDIT)
                .fields(payment_plan_fields())
                .build()?,
        );
    }
    Ok(schemas)
}
