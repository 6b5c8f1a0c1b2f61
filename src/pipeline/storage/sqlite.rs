//! SQLite warehouse backend. Each tenant namespace gets its own database file, so
//! tenants never share a table, a connection or a transaction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info, warn};

use super::traits::{staging_prefix, staging_table_name, StagingHandle, Warehouse};
use crate::common::constants::{ROW_SEQ_COLUMN, TENANT_COLUMN};
use crate::common::error::WarehouseError;
use crate::domain::{CanonicalRecord, Value};
use crate::registry::{FieldDef, FieldType, Schema};
use crate::tenant::TenantNamespace;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteWarehouse {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    root: PathBuf,
    connections: Mutex<HashMap<String, Arc<Mutex<Connection>>>>,
}

impl SqliteInner {
    fn connection(&self, namespace: &str) -> Result<Arc<Mutex<Connection>>, WarehouseError> {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = connections.get(namespace) {
            return Ok(conn.clone());
        }

        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{}.db", namespace));
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!(namespace, path = %path.display(), "Opened warehouse database");

        let conn = Arc::new(Mutex::new(conn));
        connections.insert(namespace.to_string(), conn.clone());
        Ok(conn)
    }
}

impl SqliteWarehouse {
    /// Warehouse rooted at `root`; database files are created on first use.
    pub fn open_at_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            inner: Arc::new(SqliteInner {
                root: root.as_ref().to_path_buf(),
                connections: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn database_path(&self, namespace: &TenantNamespace) -> PathBuf {
        self.inner.root.join(format!("{}.db", namespace.as_str()))
    }

    /// Tables currently present in a namespace's database, sorted by name.
    pub async fn table_names(&self, namespace: &TenantNamespace) -> Result<Vec<String>, WarehouseError> {
        self.run(namespace, |conn| list_tables(conn)).await
    }

    /// Run `f` against the namespace's connection on the blocking pool.
    async fn run<F, T>(&self, namespace: &TenantNamespace, f: F) -> Result<T, WarehouseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, WarehouseError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        let namespace = namespace.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            let conn = inner.connection(&namespace)?;
            let mut guard = conn.lock().map_err(|_| {
                WarehouseError::Unreachable(format!("connection for {} is poisoned", namespace))
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| WarehouseError::Task(e.to_string()))?
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, WarehouseError> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn column_type(field: &FieldDef) -> &'static str {
    match field.field_type {
        FieldType::Int => "INTEGER",
        _ => "TEXT",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Decimal(v) | Value::Rate(v) => SqlValue::Text(v.to_string()),
        Value::Date(v) => SqlValue::Text(v.format(DATE_FORMAT).to_string()),
        Value::Text(v) | Value::Code(v) => SqlValue::Text(v.clone()),
    }
}

fn from_sql(table: &str, field: &FieldDef, value: SqlValue) -> Result<Value, WarehouseError> {
    let corrupt = |raw: String| WarehouseError::Corrupt {
        table: table.to_string(),
        column: field.name.clone(),
        value: raw,
    };
    let text = match value {
        SqlValue::Null => return Ok(Value::Null),
        SqlValue::Integer(v) if field.field_type == FieldType::Int => return Ok(Value::Int(v)),
        SqlValue::Text(text) => text,
        other => return Err(corrupt(format!("{:?}", other))),
    };
    let value = match field.field_type {
        FieldType::Int => return Err(corrupt(text)),
        FieldType::Decimal => Value::Decimal(BigDecimal::from_str(&text).map_err(|_| corrupt(text.clone()))?),
        FieldType::Rate => Value::Rate(BigDecimal::from_str(&text).map_err(|_| corrupt(text.clone()))?),
        FieldType::Date => {
            Value::Date(NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|_| corrupt(text.clone()))?)
        }
        FieldType::String => Value::Text(text),
        FieldType::Enum => Value::Code(text),
    };
    Ok(value)
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn open_staging(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
        run_id: u64,
    ) -> Result<StagingHandle, WarehouseError> {
        let staging_table = staging_table_name(&schema.target_table, run_id);
        let prefix = staging_prefix(&schema.target_table);
        let columns: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("\"{}\" {}", f.name, column_type(f)))
            .collect();
        let create = format!(
            "CREATE TABLE \"{}\" ({} INTEGER PRIMARY KEY, {} TEXT NOT NULL, {})",
            staging_table,
            ROW_SEQ_COLUMN,
            TENANT_COLUMN,
            columns.join(", ")
        );
        let ns_label = namespace.as_str().to_string();

        self.run(namespace, move |conn| {
            for stale in list_tables(conn)?.into_iter().filter(|t| t.starts_with(&prefix)) {
                warn!(namespace = %ns_label, table = %stale, "Dropping stale staging table");
                conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", stale))?;
            }
            conn.execute_batch(&create)?;
            Ok(())
        })
        .await?;

        debug!(namespace = %namespace, table = %staging_table, "Opened staging table");
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
        if batch.is_empty() {
            return Ok(());
        }

        let columns: Vec<String> = batch[0].fields.iter().map(|(name, _)| name.clone()).collect();
        let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO \"{}\" ({}, {}) VALUES ({})",
            handle.staging_table(),
            TENANT_COLUMN,
            columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        let rows: Vec<Vec<SqlValue>> = batch
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(columns.len() + 1);
                row.push(SqlValue::Text(record.tenant_id.clone()));
                row.extend(columns.iter().map(|c| record.get(c).map(to_sql).unwrap_or(SqlValue::Null)));
                row
            })
            .collect();

        let count = rows.len() as u64;
        self.run(handle.namespace(), move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&insert)?;
                for row in rows {
                    stmt.execute(params_from_iter(row))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        handle.record_appended(count);
        Ok(())
    }

    async fn commit(&self, handle: StagingHandle) -> Result<u64, WarehouseError> {
        let target = handle.target_table().to_string();
        let staging = handle.staging_table().to_string();
        let swap = format!(
            "DROP TABLE IF EXISTS \"{target}\"; ALTER TABLE \"{staging}\" RENAME TO \"{target}\";"
        );

        let result = self
            .run(handle.namespace(), move |conn| {
                let tx = conn.transaction()?;
                tx.execute_batch(&swap)?;
                let count: i64 =
                    tx.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", target), [], |row| row.get(0))?;
                tx.commit()?;
                Ok(count as u64)
            })
            .await;

        match result {
            Ok(count) => {
                info!(
                    namespace = %handle.namespace(),
                    table = handle.target_table(),
                    records = count,
                    "Swapped snapshot"
                );
                Ok(count)
            }
            Err(e) => {
                if let Err(abort_err) = self.abort(handle).await {
                    warn!("Failed to discard staging after failed swap: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn abort(&self, handle: StagingHandle) -> Result<(), WarehouseError> {
        let drop = format!("DROP TABLE IF EXISTS \"{}\"", handle.staging_table());
        self.run(handle.namespace(), move |conn| {
            conn.execute_batch(&drop)?;
            Ok(())
        })
        .await?;
        debug!(table = handle.staging_table(), "Dropped staging table");
        Ok(())
    }

    async fn read_snapshot(
        &self,
        namespace: &TenantNamespace,
        schema: &Schema,
    ) -> Result<Vec<CanonicalRecord>, WarehouseError> {
        let table = schema.target_table.clone();
        let fields = schema.fields.clone();

        self.run(namespace, move |conn| {
            if !list_tables(conn)?.contains(&table) {
                return Ok(Vec::new());
            }
            let select = format!(
                "SELECT {}, {} FROM \"{}\" ORDER BY {}",
                TENANT_COLUMN,
                fields
                    .iter()
                    .map(|f| format!("\"{}\"", f.name))
                    .collect::<Vec<_>>()
                    .join(", "),
                table,
                ROW_SEQ_COLUMN
            );
            let mut stmt = conn.prepare(&select)?;
            let raw_rows = stmt
                .query_map([], |row| {
                    let tenant_id: String = row.get(0)?;
                    let mut values = Vec::with_capacity(fields.len());
                    for i in 0..fields.len() {
                        values.push(row.get::<_, SqlValue>(i + 1)?);
                    }
                    Ok((tenant_id, values))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut records = Vec::with_capacity(raw_rows.len());
            for (tenant_id, values) in raw_rows {
                let mut record_fields = Vec::with_capacity(fields.len());
                for (field, value) in fields.iter().zip(values) {
                    record_fields.push((field.name.clone(), from_sql(&table, field, value)?));
                }
                records.push(CanonicalRecord {
                    tenant_id,
                    fields: record_fields,
                });
            }
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantResolver;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::builder("RETAIL", "CREDIT")
            .field(FieldDef::new("loan_id", FieldType::Int).required())
            .field(FieldDef::new("rate", FieldType::Rate))
            .field(FieldDef::new("origination_date", FieldType::Date))
            .field(FieldDef::new("status", FieldType::Enum).code_table("loan_status"))
            .build()
            .unwrap()
    }

    fn record(id: i64) -> CanonicalRecord {
        CanonicalRecord {
            tenant_id: "BANK001".to_string(),
            fields: vec![
                ("loan_id".to_string(), Value::Int(id)),
                ("rate".to_string(), Value::Rate(BigDecimal::from_str("0.050000").unwrap())),
                (
                    "origination_date".to_string(),
                    Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                ),
                ("status".to_string(), Value::Null),
            ],
        }
    }

    #[tokio::test]
    async fn test_commit_round_trips_typed_values() {
        let dir = tempdir().unwrap();
        let ns = TenantResolver::new(["BANK001"]).unwrap().resolve("BANK001").unwrap();
        let warehouse = SqliteWarehouse::open_at_root(dir.path());
        let schema = schema();

        let mut handle = warehouse.open_staging(&ns, &schema, 1).await.unwrap();
        warehouse.append(&mut handle, &[record(1), record(2)]).await.unwrap();
        assert!(warehouse.read_snapshot(&ns, &schema).await.unwrap().is_empty());
        assert_eq!(warehouse.commit(handle).await.unwrap(), 2);

        let snapshot = warehouse.read_snapshot(&ns, &schema).await.unwrap();
        assert_eq!(snapshot, vec![record(1), record(2)]);
        assert!(warehouse.database_path(&ns).exists());
        assert_eq!(
            warehouse.table_names(&ns).await.unwrap(),
            vec!["fact_loans_current_retail".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stale_staging_is_dropped_on_open() {
        let dir = tempdir().unwrap();
        let ns = TenantResolver::new(["BANK001"]).unwrap().resolve("BANK001").unwrap();
        let warehouse = SqliteWarehouse::open_at_root(dir.path());
        let schema = schema();

        let abandoned = warehouse.open_staging(&ns, &schema, 1).await.unwrap();
        drop(abandoned);
        let handle = warehouse.open_staging(&ns, &schema, 2).await.unwrap();

        let tables = warehouse.table_names(&ns).await.unwrap();
        assert_eq!(tables, vec![handle.staging_table().to_string()]);
        warehouse.abort(handle).await.unwrap();
        assert!(warehouse.table_names(&ns).await.unwrap().is_empty());
    }
}
