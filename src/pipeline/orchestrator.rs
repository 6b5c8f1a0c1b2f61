//! Sync orchestration: one forward pass per (tenant, loan_type, dataset_type) key,
//! reader → validator → normalizer → staging, then an atomic swap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::common::error::{ConfigError, SourceError, SyncError};
use crate::config::{Config, WarehouseBackend};
use crate::domain::{
    CanonicalRecord, Rejection, RunSummary, SyncKey, SyncRun, SyncState, ValidationOutcome,
};
use crate::metrics::{LoaderMetrics, ReaderMetrics, SyncMetrics, ValidatorMetrics};
use crate::pipeline::ingestion::reader::warn_unknown_columns;
use crate::pipeline::ingestion::{ChunkedReader, FsSourceLocator, RawEntry, SourceLocator};
use crate::pipeline::ledger::RunLedger;
use crate::pipeline::processing::{Normalizer, Validator};
use crate::pipeline::single_flight::SingleFlight;
use crate::pipeline::storage::{InMemoryWarehouse, SqliteWarehouse, StagingHandle, Warehouse};
use crate::registry::{Schema, SchemaRegistry};
use crate::tenant::{TenantNamespace, TenantResolver};

/// Everything a run needs, resolved before the key is locked.
struct RunPlan {
    namespace: TenantNamespace,
    schema: Arc<Schema>,
    reference: Option<Arc<Schema>>,
    key: SyncKey,
}

pub struct SyncOrchestrator {
    registry: Arc<SchemaRegistry>,
    tenants: Arc<TenantResolver>,
    sources: Arc<dyn SourceLocator>,
    warehouse: Arc<dyn Warehouse>,
    normalizer: Normalizer,
    ledger: RunLedger,
    flights: SingleFlight,
    chunk_size: usize,
}

impl SyncOrchestrator {
    pub fn new(
        registry: SchemaRegistry,
        tenants: TenantResolver,
        sources: Arc<dyn SourceLocator>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            tenants: Arc::new(tenants),
            sources,
            warehouse,
            normalizer: Normalizer::new(),
            ledger: RunLedger::new(),
            flights: SingleFlight::new(),
            chunk_size: crate::common::constants::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Rows per batch; values below 1 are raised to 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Wire the registry, tenants, file sources and warehouse backend from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registry = match &config.registry.schema_dir {
            Some(dir) => SchemaRegistry::with_schema_dir(dir)?,
            None => SchemaRegistry::builtin()?,
        };
        let tenants = TenantResolver::new(&config.tenants)?;
        let sources: Arc<dyn SourceLocator> = Arc::new(FsSourceLocator::new(&config.sources.root));
        let warehouse: Arc<dyn Warehouse> = match config.warehouse.backend {
            WarehouseBackend::Memory => Arc::new(InMemoryWarehouse::new()),
            WarehouseBackend::Sqlite => Arc::new(SqliteWarehouse::open_at_root(&config.warehouse.root)),
        };
        info!(
            backend = ?config.warehouse.backend,
            schemas = registry.len(),
            chunk_size = config.pipeline.chunk_size,
            "Configured sync orchestrator"
        );
        Ok(Self::new(registry, tenants, sources, warehouse).with_chunk_size(config.pipeline.chunk_size))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn tenants(&self) -> &TenantResolver {
        &self.tenants
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run the pipeline for one key and publish its snapshot.
    ///
    /// Unknown tenants and dataset kinds fail before a run id is allocated, as does a
    /// request for a key that is already running. Source and warehouse failures finish
    /// the run as failed, discard staging and leave the previous snapshot in place.
    pub async fn start_sync(
        &self,
        tenant_id: &str,
        loan_type: &str,
        dataset_type: &str,
    ) -> Result<SyncRun, SyncError> {
        let plan = self.plan(tenant_id, loan_type, dataset_type).map_err(|e| {
            SyncMetrics::record_refused(e.kind());
            e
        })?;

        let _flight = match self.flights.try_acquire(&plan.key) {
            Some(guard) => guard,
            None => {
                warn!(key = %plan.key, "⏳ Sync already in progress");
                let err = SyncError::SyncAlreadyInProgress(plan.key.clone());
                SyncMetrics::record_refused(err.kind());
                return Err(err);
            }
        };

        let mut run = self.ledger.begin(plan.key.clone());
        SyncMetrics::record_run_started();
        let started = Instant::now();
        info!(
            run_id = run.run_id,
            tenant = %plan.key.tenant,
            loan_type = %plan.key.kind.loan_type,
            dataset_type = %plan.key.kind.dataset_type,
            "🔄 Starting sync"
        );

        let result = self.execute(&plan, &mut run).await;
        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(()) => {
                run.succeed();
                SyncMetrics::record_run_succeeded(elapsed);
                info!(
                    run_id = run.run_id,
                    key = %plan.key,
                    accepted = run.accepted_count,
                    rejected = run.rejected_count,
                    "✅ Sync completed"
                );
            }
            Err(e) => {
                run.fail(e.to_string());
                SyncMetrics::record_run_failed(e.kind(), elapsed);
                error!(run_id = run.run_id, key = %plan.key, error = %e, "❌ Sync failed");
            }
        }
        self.ledger.finish(&run);

        result.map(|()| run)
    }

    /// Latest committed snapshot for a key.
    pub async fn read_snapshot(
        &self,
        tenant_id: &str,
        loan_type: &str,
        dataset_type: &str,
    ) -> Result<Vec<CanonicalRecord>, SyncError> {
        let namespace = self.tenants.resolve(tenant_id)?;
        let schema = self.registry.resolve(loan_type, dataset_type)?;
        self.warehouse
            .read_snapshot(&namespace, &schema)
            .await
            .map_err(SyncError::ReadFailure)
    }

    /// Summary of the most recent run for a key, `None` if it never ran.
    pub fn read_run_summary(
        &self,
        tenant_id: &str,
        loan_type: &str,
        dataset_type: &str,
    ) -> Result<Option<RunSummary>, SyncError> {
        let plan = self.plan(tenant_id, loan_type, dataset_type)?;
        Ok(self.ledger.latest(&plan.key).map(|run| run.summary()))
    }

    pub fn state(&self, tenant_id: &str, loan_type: &str, dataset_type: &str) -> Result<SyncState, SyncError> {
        let plan = self.plan(tenant_id, loan_type, dataset_type)?;
        if self.flights.is_running(&plan.key) {
            return Ok(SyncState::Running);
        }
        Ok(self.ledger.state(&plan.key))
    }

    fn plan(&self, tenant_id: &str, loan_type: &str, dataset_type: &str) -> Result<RunPlan, SyncError> {
        let namespace = self.tenants.resolve(tenant_id)?;
        let schema = self.registry.resolve(loan_type, dataset_type)?;
        let reference = match &schema.reference {
            Some(referenced) => Some(self.registry.resolve(&schema.kind.loan_type, referenced)?),
            None => None,
        };
        let key = SyncKey::new(namespace.tenant_code(), schema.kind.clone());
        Ok(RunPlan {
            namespace,
            schema,
            reference,
            key,
        })
    }

    async fn execute(&self, plan: &RunPlan, run: &mut SyncRun) -> Result<(), SyncError> {
        let mut validator = match &plan.reference {
            Some(reference) => {
                Validator::seeded(self.reference_keys(&plan.namespace, reference).await?)
            }
            None => Validator::new(),
        };

        let source = self.sources.locate(&plan.namespace, &plan.schema.kind);
        let reader = ChunkedReader::open_blocking(source, self.chunk_size)
            .await
            .map_err(source_failure)?;
        warn_unknown_columns(&reader, &plan.schema.field_names());

        let mut staging = self
            .warehouse
            .open_staging(&plan.namespace, &plan.schema, run.run_id)
            .await
            .map_err(write_failure)?;

        let streamed = self
            .stream(reader, &mut validator, plan, &mut staging, run)
            .await;

        match streamed {
            Ok(()) => {
                let published = self.warehouse.commit(staging).await.map_err(write_failure)?;
                LoaderMetrics::record_commit(published);
                debug!(run_id = run.run_id, records = published, "Snapshot published");
                Ok(())
            }
            Err(e) => {
                match self.warehouse.abort(staging).await {
                    Ok(()) => LoaderMetrics::record_abort(),
                    Err(abort_err) => {
                        warn!(run_id = run.run_id, error = %abort_err, "Failed to discard staging")
                    }
                }
                Err(e)
            }
        }
    }

    /// Stream the referenced dataset through a validator and normalizer for its schema
    /// and return the keys of rows that pass both. Nothing is loaded or counted.
    async fn reference_keys(
        &self,
        namespace: &TenantNamespace,
        reference: &Schema,
    ) -> Result<HashSet<String>, SyncError> {
        let source = self.sources.locate(namespace, &reference.kind);
        let mut reader = match ChunkedReader::open_blocking(source, self.chunk_size).await {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                warn!(
                    tenant = namespace.tenant_code(),
                    kind = %reference.kind,
                    "Referenced source not found; every row will be an orphan"
                );
                return Ok(HashSet::new());
            }
            Err(e) => return Err(source_failure(e)),
        };

        let mut validator = Validator::new();
        loop {
            let (returned, batch) = reader.next_batch_blocking().await.map_err(source_failure)?;
            reader = returned;
            let Some(batch) = batch else { break };
            for entry in batch.entries {
                let RawEntry::Row(row) = entry else { continue };
                if let ValidationOutcome::Accepted(row) = validator.validate(row, reference) {
                    if self.normalizer.normalize(&row, reference, namespace).is_ok() {
                        validator.confirm(&row, reference);
                    }
                }
            }
        }

        let keys = validator.into_accepted_keys();
        ValidatorMetrics::record_reference_keys(keys.len());
        debug!(kind = %reference.kind, keys = keys.len(), "Seeded reference keys");
        Ok(keys)
    }

    async fn stream(
        &self,
        mut reader: ChunkedReader,
        validator: &mut Validator,
        plan: &RunPlan,
        staging: &mut StagingHandle,
        run: &mut SyncRun,
    ) -> Result<(), SyncError> {
        let schema = plan.schema.as_ref();

        loop {
            let (returned, batch) = reader.next_batch_blocking().await.map_err(source_failure)?;
            reader = returned;
            let Some(batch) = batch else { break };
            ReaderMetrics::record_batch(batch.len());
            let mut records = Vec::with_capacity(batch.len());
            let mut malformed = 0;

            for entry in batch.entries {
                let row = match entry {
                    RawEntry::Row(row) => row,
                    RawEntry::Malformed(rejection) => {
                        malformed += 1;
                        reject(run, rejection);
                        continue;
                    }
                };

                match validator.validate(row, schema) {
                    ValidationOutcome::Accepted(row) => {
                        match self.normalizer.normalize(&row, schema, &plan.namespace) {
                            Ok(record) => {
                                validator.confirm(&row, schema);
                                records.push(record);
                            }
                            Err(e) => reject(
                                run,
                                Rejection {
                                    row_number: row.row_number,
                                    field: Some(e.field().to_string()),
                                    reason: e.reason(),
                                    message: e.to_string(),
                                },
                            ),
                        }
                    }
                    ValidationOutcome::Rejected {
                        row,
                        reason,
                        field,
                        message,
                    } => reject(
                        run,
                        Rejection {
                            row_number: row.row_number,
                            field,
                            reason,
                            message,
                        },
                    ),
                }
            }
            ReaderMetrics::record_malformed_rows(malformed);

            if records.is_empty() {
                continue;
            }
            let append_started = Instant::now();
            self.warehouse
                .append(staging, &records)
                .await
                .map_err(write_failure)?;
            LoaderMetrics::record_append(records.len(), append_started.elapsed().as_secs_f64());
            ValidatorMetrics::record_accepted(records.len() as u64);
            run.accepted_count += records.len() as u64;
        }
        Ok(())
    }
}

fn reject(run: &mut SyncRun, rejection: Rejection) {
    debug!(
        run_id = run.run_id,
        row = rejection.row_number,
        field = rejection.field.as_deref().unwrap_or("-"),
        reason = %rejection.reason,
        "Row rejected: {}",
        rejection.message
    );
    ValidatorMetrics::record_rejected(rejection.reason);
    run.reject(rejection);
}

fn source_failure(e: SourceError) -> SyncError {
    ReaderMetrics::record_source_error(if e.is_not_found() { "not_found" } else { "read" });
    SyncError::SourceUnreadable(e)
}

fn write_failure(e: crate::common::error::WarehouseError) -> SyncError {
    LoaderMetrics::record_write_error();
    SyncError::WriteFailure(e)
}
