use async_trait::async_trait;

use crate::common::error::WarehouseError;
use crate::domain::{CanonicalRecord, DatasetKind};
use crate::registry::Schema;
use crate::tenant::TenantNamespace;

/// A write-only staging area for one run. Move-only: `commit` and `abort` consume it,
/// so a staging area is finished at most once.
#[derive(Debug)]
pub struct StagingHandle {
    namespace: TenantNamespace,
    kind: DatasetKind,
    target_table: String,
    staging_table: String,
    run_id: u64,
    appended: u64,
}

impl StagingHandle {
    pub fn new(
        namespace: TenantNamespace,
        kind: DatasetKind,
        target_table: String,
        staging_table: String,
        run_id: u64,
    ) -> Self {
        Self {
            namespace,
            kind,
            target_table,
            staging_table,
            run_id,
            appended: 0,
        }
    }

    pub fn namespace(&self) -> &TenantNamespace {
        &self.namespace
    }

    pub fn kind(&self) -> &DatasetKind {
        &self.kind
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn staging_table(&self) -> &str {
        &self.staging_table
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Records appended so far.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn record_appended(&mut self, count: u64) {
        self.appended += count;
    }

    /// Refuse records that belong to another tenant.
    pub fn check_tenant(&self, batch: &[CanonicalRecord]) -> Result<(), WarehouseError> {
        match batch
            .iter()
            .find(|r| r.tenant_id != self.namespace.tenant_code())
        {
            Some(foreign) => Err(WarehouseError::TenantMismatch {
                expected: self.namespace.tenant_code().to_string(),
                found: foreign.tenant_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Tenant-partitioned snapshot store with staging-then-swap publishing.
///
/// `commit` is the only operation that changes what `read_snapshot` returns, and it
/// replaces the whole snapshot at once.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn open_staging(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
        run_id: u64,
    ) -> Result<StagingHandle, WarehouseError>;

    async fn append(
        &self,
        staging: &mut StagingHandle,
        batch: &[CanonicalRecord],
    ) -> Result<(), WarehouseError>;

    /// Promote staging to the current snapshot. Returns the number of records published.
    async fn commit(&self, staging: StagingHandle) -> Result<u64, WarehouseError>;

    /// Discard staging; the current snapshot is untouched.
    async fn abort(&self, staging: StagingHandle) -> Result<(), WarehouseError>;

    /// Records of the latest committed snapshot in insertion order; empty if none.
    async fn read_snapshot(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
    ) -> Result<Vec<CanonicalRecord>, WarehouseError>;
}

/// Staging table name for a run, unique even when run ids restart with the process.
pub fn staging_table_name(target_table: &str, run_id: u64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_staging_{}_{}", target_table, run_id, &suffix[..8])
}

/// Prefix shared by every staging table of `target_table`.
pub fn staging_prefix(target_table: &str) -> String {
    format!("{}_staging_", target_table)
}
