use super::traits::{staging_table_name, StagingHandle, Warehouse};
use crate::common::error::WarehouseError;
use crate::domain::CanonicalRecord;
use crate::registry::Schema;
use crate::tenant::TenantNamespace;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

type SnapshotKey = (String, String);

/// In-memory warehouse for development/testing.
///
/// Snapshots are shared `Arc<Vec<_>>` values; a commit swaps the `Arc` under the write
/// lock, so readers see either the old or the new snapshot, never a mix.
#[derive(Default)]
pub struct InMemoryWarehouse {
    snapshots: RwLock<HashMap<SnapshotKey, Arc<Vec<CanonicalRecord>>>>,
    staging: Mutex<HashMap<String, Vec<CanonicalRecord>>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staging areas currently open.
    pub fn open_staging_count(&self) -> usize {
        self.staging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot_key(namespace: &TenantNamespace, table: &str) -> SnapshotKey {
        (namespace.as_str().to_string(), table.to_string())
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn open_staging(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
        run_id: u64,
    ) -> Result<StagingHandle, WarehouseError> {
        let staging_table = staging_table_name(&schema.target_table, run_id);
        let mut staging = self.staging.lock().unwrap_or_else(PoisonError::into_inner);
        staging.insert(staging_table.clone(), Vec::new());

        debug!(namespace = %namespace, table = %staging_table, "Opened in-memory staging");
        Ok(StagingHandle::new(
            namespace.clone(),
            schema.kind.clone(),
            schema.target_table.clone(),
            staging_table,
            run_id,
        ))
    }

    async fn append(
        &self,
        handle: &mut StagingHandle,
        batch: &[CanonicalRecord],
    ) -> Result<(), WarehouseError> {
        handle.check_tenant(batch)?;
        let mut staging = self.staging.lock().unwrap_or_else(PoisonError::into_inner);
        let rows = staging
            .get_mut(handle.staging_table())
            .ok_or_else(|| WarehouseError::UnknownStaging(handle.staging_table().to_string()))?;
        rows.extend_from_slice(batch);
        handle.record_appended(batch.len() as u64);
        Ok(())
    }

    async fn commit(&self, handle: StagingHandle) -> Result<u64, WarehouseError> {
        let rows = self
            .staging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle.staging_table())
            .ok_or_else(|| WarehouseError::UnknownStaging(handle.staging_table().to_string()))?;
        let count = rows.len() as u64;

        let key = Self::snapshot_key(handle.namespace(), handle.target_table());
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(key, Arc::new(rows));

        debug!(
            namespace = %handle.namespace(),
            table = handle.target_table(),
            records = count,
            "Swapped in-memory snapshot"
        );
        Ok(count)
    }

    async fn abort(&self, handle: StagingHandle) -> Result<(), WarehouseError> {
        self.staging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle.staging_table());
        debug!(table = handle.staging_table(), "Discarded in-memory staging");
        Ok(())
    }

    async fn read_snapshot(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
    ) -> Result<Vec<CanonicalRecord>, WarehouseError> {
        let snapshot = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::snapshot_key(namespace, &schema.target_table))
            .cloned();
        Ok(snapshot.map(|rows| rows.as_ref().clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use crate::registry::{FieldDef, FieldType};
    use crate::tenant::TenantResolver;

    fn schema() -> Schema {
        Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .build()
            .unwrap()
    }

    fn record(tenant: &str, id: i64) -> CanonicalRecord {
        CanonicalRecord {
            tenant_id: tenant.to_string(),
            fields: vec![("loan_id".to_string(), Value::Int(id))],
        }
    }

    #[tokio::test]
    async fn test_staging_invisible_until_commit() {
        let resolver = TenantResolver::new(["BANK001"]).unwrap();
        let ns = resolver.resolve("BANK001").unwrap();
        let warehouse = InMemoryWarehouse::new();
        let schema = schema();

        let mut handle = warehouse.open_staging(&ns, &schema, 1).await.unwrap();
        warehouse
            .append(&mut handle, &[record("BANK001", 1), record("BANK001", 2)])
            .await
            .unwrap();
        assert_eq!(handle.appended(), 2);
        assert!(warehouse.read_snapshot(&ns, &schema).await.unwrap().is_empty());

        assert_eq!(warehouse.commit(handle).await.unwrap(), 2);
        let snapshot = warehouse.read_snapshot(&ns, &schema).await.unwrap();
        assert_eq!(snapshot, vec![record("BANK001", 1), record("BANK001", 2)]);
        assert_eq!(warehouse.open_staging_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_keeps_previous_snapshot() {
        let resolver = TenantResolver::new(["BANK001"]).unwrap();
        let ns = resolver.resolve("BANK001").unwrap();
        let warehouse = InMemoryWarehouse::new();
        let schema = schema();

        let mut first = warehouse.open_staging(&ns, &schema, 1).await.unwrap();
        warehouse.append(&mut first, &[record("BANK001", 1)]).await.unwrap();
        warehouse.commit(first).await.unwrap();

        let mut second = warehouse.open_staging(&ns, &schema, 2).await.unwrap();
        warehouse.append(&mut second, &[record("BANK001", 9)]).await.unwrap();
        warehouse.abort(second).await.unwrap();

        let snapshot = warehouse.read_snapshot(&ns, &schema).await.unwrap();
        assert_eq!(snapshot, vec![record("BANK001", 1)]);
        assert_eq!(warehouse.open_staging_count(), 0);
    }

    #[tokio::test]
    async fn test_append_refuses_foreign_tenant_records() {
        let resolver = TenantResolver::new(["BANK001", "BANK002"]).unwrap();
        let ns = resolver.resolve("BANK001").unwrap();
        let warehouse = InMemoryWarehouse::new();

        let mut handle = warehouse.open_staging(&ns, &schema(), 1).await.unwrap();
        let result = warehouse.append(&mut handle, &[record("BANK002", 1)]).await;
        assert!(matches!(result, Err(WarehouseError::TenantMismatch { .. })));
        assert_eq!(handle.appended(), 0);
    }

    #[tokio::test]
    async fn test_snapshots_are_partitioned_by_namespace() {
        let resolver = TenantResolver::new(["BANK001", "BANK002"]).unwrap();
        let a = resolver.resolve("BANK001").unwrap();
        let b = resolver.resolve("BANK002").unwrap();
        let warehouse = InMemoryWarehouse::new();
        let schema = schema();

        let mut handle = warehouse.open_staging(&a, &schema, 1).await.unwrap();
        warehouse.append(&mut handle, &[record("BANK001", 1)]).await.unwrap();
        warehouse.commit(handle).await.unwrap();

        assert_eq!(warehouse.read_snapshot(&a, &schema).await.unwrap().len(), 1);
        assert!(warehouse.read_snapshot(&b, &schema).await.unwrap().is_empty());
    }
}
