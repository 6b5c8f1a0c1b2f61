#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use loan_sync::domain::CanonicalRecord;
use loan_sync::pipeline::ingestion::InMemorySourceLocator;
use loan_sync::pipeline::storage::{InMemoryWarehouse, StagingHandle, Warehouse};
use loan_sync::registry::{FieldDef, FieldType, Schema, SchemaRegistry};
use loan_sync::tenant::{TenantNamespace, TenantResolver};
use loan_sync::{SyncOrchestrator, WarehouseError};
use tokio::sync::Notify;

pub const SCENARIO_HEADER: &str = "loan_id,rate,origination_date";

/// RETAIL/CREDIT with `loan_id, rate (0-1), origination_date`, and a RETAIL/PAYMENT_PLAN
/// that references it by `loan_id`.
pub fn scenario_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::empty();
    registry.register(
        Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .field(FieldDef::new("rate", FieldType::Rate).required().min(0).max(1))
            .field(FieldDef::new("origination_date", FieldType::Date).required())
            .field(FieldDef::new("status", FieldType::Enum).code_table("loan_status"))
            .build()
            .expect("credit schema"),
    );
    registry.register(
        Schema::builder("RETAIL", "PAYMENT_PLAN")
            .key_field("loan_id")
            .references("CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .field(FieldDef::new("installment_number", FieldType::Int).required().min(1))
            .field(FieldDef::new("installment_amount", FieldType::Decimal).required().min(0))
            .build()
            .expect("payment plan schema"),
    );
    registry
}

pub fn tenants() -> TenantResolver {
    TenantResolver::new(["BANK001", "BANK002"]).expect("tenant codes")
}

pub fn orchestrator(
    sources: Arc<InMemorySourceLocator>,
    warehouse: Arc<dyn Warehouse>,
    chunk_size: usize,
) -> SyncOrchestrator {
    SyncOrchestrator::new(scenario_registry(), tenants(), sources, warehouse).with_chunk_size(chunk_size)
}

pub fn csv(header: &str, rows: &[&str]) -> String {
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

/// Delegates to another warehouse but fails the `fail_on`-th append (1-based).
pub struct FlakyWarehouse {
    pub inner: Arc<dyn Warehouse>,
    appends: AtomicUsize,
    fail_on: usize,
}

impl FlakyWarehouse {
    pub fn new(inner: Arc<dyn Warehouse>, fail_on: usize) -> Self {
        Self {
            inner,
            appends: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl Warehouse for FlakyWarehouse {
    async fn open_staging(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
        run_id: u64,
    ) -> Result<StagingHandle, WarehouseError> {
        self.inner.open_staging(namespace, schema, run_id).await
    }

    async fn append(
        &self,
        staging: &mut StagingHandle,
        batch: &[CanonicalRecord],
    ) -> Result<(), WarehouseError> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(WarehouseError::Unreachable("connection reset".to_string()));
        }
        self.inner.append(staging, batch).await
    }

    async fn commit(&self, staging: StagingHandle) -> Result<u64, WarehouseError> {
        self.inner.commit(staging).await
    }

    async fn abort(&self, staging: StagingHandle) -> Result<(), WarehouseError> {
        self.inner.abort(staging).await
    }

    async fn read_snapshot(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
    ) -> Result<Vec<CanonicalRecord>, WarehouseError> {
        self.inner.read_snapshot(namespace, schema).await
    }
}

/// Delegates to an in-memory warehouse but holds every append until released.
pub struct GatedWarehouse {
    pub inner: Arc<InMemoryWarehouse>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedWarehouse {
    pub fn new(inner: Arc<InMemoryWarehouse>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl Warehouse for GatedWarehouse {
    async fn open_staging(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
        run_id: u64,
    ) -> Result<StagingHandle, WarehouseError> {
        self.inner.open_staging(namespace, schema, run_id).await
    }

    async fn append(
        &self,
        staging: &mut StagingHandle,
        batch: &[CanonicalRecord],
    ) -> Result<(), WarehouseError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.append(staging, batch).await
    }

    async fn commit(&self, staging: StagingHandle) -> Result<u64, WarehouseError> {
        self.inner.commit(staging).await
    }

    async fn abort(&self, staging: StagingHandle) -> Result<(), WarehouseError> {
        self.inner.abort(staging).await
    }

    async fn read_snapshot(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
    ) -> Result<Vec<CanonicalRecord>, WarehouseError> {
        self.inner.read_snapshot(namespace, schema).await
    }
}
