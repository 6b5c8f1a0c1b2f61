//! Dataset and loan-type identifiers used across the registry, source layout and warehouse naming.
//! Inputs from callers are normalized with [`normalize_code`] before being compared to these.

// Loan types
pub const RETAIL: &str = "RETAIL";
pub const COMMERCIAL: &str = "COMMERCIAL";
pub const LOAN_TYPES: [&str; 2] = [RETAIL, COMMERCIAL];

// Dataset types
pub const CREDIT: &str = "CREDIT";
pub const PAYMENT_PLAN: &str = "PAYMENT_PLAN";
pub const DATASET_TYPES: [&str; 2] = [CREDIT, PAYMENT_PLAN];

// Warehouse naming
pub const NAMESPACE_PREFIX: &str = "dwh_";
pub const CREDIT_TABLE_PREFIX: &str = "fact_loans_current";
pub const PAYMENT_PLAN_TABLE_PREFIX: &str = "fact_payment_plan_current";
pub const TENANT_COLUMN: &str = "tenant_id";
pub const ROW_SEQ_COLUMN: &str = "_row_seq";
/// Columns every warehouse table carries besides the schema fields
pub const RESERVED_COLUMNS: [&str; 2] = [TENANT_COLUMN, ROW_SEQ_COLUMN];

// Pipeline defaults
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_TENANTS: [&str; 3] = ["BANK001", "BANK002", "BANK003"];

/// Trim and upper-case a tenant code, loan type or dataset type.
pub fn normalize_code(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Warehouse table holding the current snapshot for a dataset kind.
pub fn target_table_name(loan_type: &str, dataset_type: &str) -> String {
    let prefix = match dataset_type {
        CREDIT => CREDIT_TABLE_PREFIX.to_string(),
        PAYMENT_PLAN => PAYMENT_PLAN_TABLE_PREFIX.to_string(),
        other => format!("fact_{}_current", other.to_lowercase()),
    };
    format!("{}_{}", prefix, loan_type.to_lowercase())
}
