//! Data shapes shared by every pipeline stage: dataset kinds, raw and canonical rows,
//! validation outcomes and sync run summaries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::common::constants::normalize_code;

/// A (loan_type, dataset_type) pair, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKind {
    pub loan_type: String,
    pub dataset_type: String,
}

impl DatasetKind {
    pub fn new(loan_type: &str, dataset_type: &str) -> Self {
        Self {
            loan_type: normalize_code(loan_type),
            dataset_type: normalize_code(dataset_type),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.loan_type, self.dataset_type)
    }
}

/// The processing key a sync run is single-flighted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    pub tenant: String,
    pub kind: DatasetKind,
}

impl SyncKey {
    pub fn new(tenant: &str, kind: DatasetKind) -> Self {
        Self {
            tenant: normalize_code(tenant),
            kind,
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.kind)
    }
}

/// One CSV data row as read from the source, keyed by lower-cased header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position among data rows (the header is not counted)
    pub row_number: u64,
    pub values: HashMap<String, String>,
}

impl RawRow {
    pub fn new(row_number: u64, values: HashMap<String, String>) -> Self {
        Self { row_number, values }
    }

    /// Trimmed value for `field`; `None` when absent or blank.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Why a row was excluded from the canonical record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MalformedRow,
    MissingRequired,
    InvalidType,
    OutOfRange,
    OrphanReference,
    UnmappedCategory,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MalformedRow => "malformed_row",
            RejectReason::MissingRequired => "missing_required",
            RejectReason::InvalidType => "invalid_type",
            RejectReason::OutOfRange => "out_of_range",
            RejectReason::OrphanReference => "orphan_reference",
            RejectReason::UnmappedCategory => "unmapped_category",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-row context for a rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub row_number: u64,
    pub field: Option<String>,
    pub reason: RejectReason,
    pub message: String,
}

/// Result of validating one raw row. Produced once per row and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(RawRow),
    Rejected {
        row: RawRow,
        reason: RejectReason,
        field: Option<String>,
        message: String,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected { reason, .. } => Some(*reason),
        }
    }
}

/// A typed field value in a canonical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    /// Monetary amount at fixed scale 2
    Decimal(BigDecimal),
    /// Fractional rate at fixed scale 6 (0.05 for 5%)
    Rate(BigDecimal),
    Date(NaiveDate),
    Text(String),
    /// Canonical category code from a code table
    Code(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(v) | Value::Rate(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) | Value::Code(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::Rate(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Text(v) | Value::Code(v) => f.write_str(v),
        }
    }
}

/// A normalized row: typed values in schema field order plus the owning tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub tenant_id: String,
    pub fields: Vec<(String, Value)>,
}

impl CanonicalRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("tenant_id", &self.tenant_id)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Observable state of a sync key. Terminal states behave as idle for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// One execution of the pipeline for a sync key.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub run_id: u64,
    pub key: SyncKey,
    pub status: RunStatus,
    pub accepted_count: u64,
    pub rejected_count: u64,
    pub rejections: Vec<Rejection>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn start(run_id: u64, key: SyncKey) -> Self {
        Self {
            run_id,
            key,
            status: RunStatus::Running,
            accepted_count: 0,
            rejected_count: 0,
            rejections: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn reject(&mut self, rejection: Rejection) {
        self.rejected_count += 1;
        self.rejections.push(rejection);
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: String) {
        self.status = RunStatus::Failed;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
    }

    /// Number of rejections per reason code.
    pub fn rejection_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for rejection in &self.rejections {
            *counts.entry(rejection.reason.code().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            status: self.status,
            accepted_count: self.accepted_count,
            rejected_count: self.rejected_count,
            rejection_counts: self.rejection_counts(),
            rejection_reasons: self.rejections.clone(),
            last_run_timestamp: self.finished_at.unwrap_or(self.started_at),
            error: self.error.clone(),
        }
    }
}

/// Profiling view of the latest run for a key.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub status: RunStatus,
    pub accepted_count: u64,
    pub rejected_count: u64,
    pub rejection_counts: BTreeMap<String, u64>,
    pub rejection_reasons: Vec<Rejection>,
    pub last_run_timestamp: DateTime<Utc>,
    pub error: Option<String>,
}
