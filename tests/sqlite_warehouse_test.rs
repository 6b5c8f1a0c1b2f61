mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use loan_sync::domain::{RejectReason, RunStatus, Value};
use loan_sync::pipeline::ingestion::FsSourceLocator;
use loan_sync::pipeline::storage::SqliteWarehouse;
use loan_sync::registry::SchemaRegistry;
use loan_sync::tenant::TenantResolver;
use loan_sync::{Config, SyncError, SyncOrchestrator};
use tempfile::tempdir;

use common::FlakyWarehouse;

const CREDIT_HEADER: &str =
    "loan_account_number,customer_type,loan_status_code,original_loan_amount,nominal_interest_rate,loan_start_date";
const PLAN_HEADER: &str =
    "loan_account_number,installment_number,scheduled_payment_date,installment_amount,installment_status";

fn write_source(root: &Path, tenant: &str, file: &str, header: &str, rows: &[&str]) -> Result<()> {
    let dir = root.join(tenant);
    fs::create_dir_all(&dir)?;
    let mut content = format!("{}\n", header);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(dir.join(file), content)?;
    Ok(())
}

fn config_for(sources: &Path, warehouse: &Path) -> Result<Config> {
    let toml = format!(
        r#"
        tenants = ["BANK001", "BANK002"]

        [pipeline]
        chunk_size = 2

        [sources]
        root = "{}"

        [warehouse]
        backend = "sqlite"
        root = "{}"
        "#,
        sources.display(),
        warehouse.display()
    );
    Ok(Config::from_toml_str(&toml)?)
}

#[tokio::test]
async fn test_configured_sqlite_sync_publishes_snapshot() -> Result<()> {
    let sources = tempdir()?;
    let warehouse = tempdir()?;
    write_source(
        sources.path(),
        "BANK001",
        "retail_credit.csv",
        CREDIT_HEADER,
        &[
            "L-1,Bireysel,Aktif,10000,5%,2024-01-15",
            "L-2,Bireysel,Gecikmiş,25000,0.045,2024-02-01",
            "L-3,Bireysel,Aktif,,5%,2024-02-01",
        ],
    )?;
    write_source(
        sources.path(),
        "BANK001",
        "retail_payment_plan.csv",
        PLAN_HEADER,
        &[
            "L-1,1,2024-02-15,850.25,A",
            "L-1,2,2024-03-15,850.25,A",
            "L-3,1,2024-03-01,1200,A",
        ],
    )?;

    let orchestrator = SyncOrchestrator::from_config(&config_for(sources.path(), warehouse.path())?)?;

    let credit = orchestrator.start_sync("BANK001", "RETAIL", "CREDIT").await?;
    assert_eq!(credit.accepted_count, 2);
    assert_eq!(credit.rejections[0].reason, RejectReason::MissingRequired);

    let plan = orchestrator.start_sync("BANK001", "RETAIL", "PAYMENT_PLAN").await?;
    assert_eq!(plan.accepted_count, 2);
    assert_eq!(plan.rejections[0].row_number, 3);
    assert_eq!(plan.rejections[0].reason, RejectReason::OrphanReference);

    let snapshot = orchestrator.read_snapshot("BANK001", "RETAIL", "CREDIT").await?;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1].get("loan_status_code"), Some(&Value::Code("OVERDUE".to_string())));

    assert!(warehouse.path().join("dwh_bank001.db").exists());
    assert!(!warehouse.path().join("dwh_bank002.db").exists());

    Ok(())
}

#[tokio::test]
async fn test_sqlite_rerun_swaps_snapshot_and_drops_staging() -> Result<()> {
    let sources = tempdir()?;
    let root = tempdir()?;
    write_source(
        sources.path(),
        "BANK002",
        "commercial_credit.csv",
        CREDIT_HEADER,
        &["C-1,Tüzel,Aktif,1000000,12%,2023-06-30", "C-2,Tüzel,Aktif,2000000,11%,2023-07-31"],
    )?;

    let tenants = TenantResolver::new(["BANK002"])?;
    let namespace = tenants.resolve("BANK002")?;
    let warehouse = Arc::new(SqliteWarehouse::open_at_root(root.path()));
    let orchestrator = SyncOrchestrator::new(
        SchemaRegistry::builtin()?,
        tenants,
        Arc::new(FsSourceLocator::new(sources.path())),
        warehouse.clone(),
    )
    .with_chunk_size(1);

    orchestrator.start_sync("BANK002", "COMMERCIAL", "CREDIT").await?;
    assert_eq!(
        orchestrator.read_snapshot("BANK002", "COMMERCIAL", "CREDIT").await?.len(),
        2
    );

    write_source(
        sources.path(),
        "BANK002",
        "commercial_credit.csv",
        CREDIT_HEADER,
        &["C-9,Tüzel,Kapalı,50000,9%,2022-01-01"],
    )?;
    orchestrator.start_sync("BANK002", "COMMERCIAL", "CREDIT").await?;

    let snapshot = orchestrator.read_snapshot("BANK002", "COMMERCIAL", "CREDIT").await?;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].get("loan_account_number"), Some(&Value::Text("C-9".to_string())));
    assert_eq!(snapshot[0].tenant_id, "BANK002");

    assert_eq!(
        warehouse.table_names(&namespace).await?,
        vec!["fact_loans_current_commercial".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn test_sqlite_write_failure_discards_staging() -> Result<()> {
    let sources = tempdir()?;
    let root = tempdir()?;
    write_source(
        sources.path(),
        "BANK001",
        "retail_credit.csv",
        CREDIT_HEADER,
        &["L-1,Bireysel,Aktif,10000,5%,2024-01-15"],
    )?;

    let tenants = TenantResolver::new(["BANK001"])?;
    let namespace = tenants.resolve("BANK001")?;
    let sqlite = Arc::new(SqliteWarehouse::open_at_root(root.path()));
    let locator = Arc::new(FsSourceLocator::new(sources.path()));

    let healthy = SyncOrchestrator::new(
        SchemaRegistry::builtin()?,
        tenants.clone(),
        locator.clone(),
        sqlite.clone(),
    );
    healthy.start_sync("BANK001", "RETAIL", "CREDIT").await?;

    write_source(
        sources.path(),
        "BANK001",
        "retail_credit.csv",
        CREDIT_HEADER,
        &[
            "L-7,Bireysel,Aktif,10000,5%,2024-01-15",
            "L-8,Bireysel,Aktif,10000,5%,2024-01-15",
        ],
    )?;
    let failing = SyncOrchestrator::new(
        SchemaRegistry::builtin()?,
        tenants,
        locator,
        Arc::new(FlakyWarehouse::new(sqlite.clone(), 2)),
    )
    .with_chunk_size(1);

    let err = failing
        .start_sync("BANK001", "RETAIL", "CREDIT")
        .await
        .expect_err("second append fails");
    assert!(matches!(err, SyncError::WriteFailure(_)));
    let summary = failing
        .read_run_summary("BANK001", "RETAIL", "CREDIT")?
        .expect("failed run is recorded");
    assert_eq!(summary.status, RunStatus::Failed);

    let snapshot = healthy.read_snapshot("BANK001", "RETAIL", "CREDIT").await?;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].get("loan_account_number"), Some(&Value::Text("L-1".to_string())));
    assert_eq!(
        sqlite.table_names(&namespace).await?,
        vec!["fact_loans_current_retail".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn test_missing_source_file_is_not_found() -> Result<()> {
    let sources = tempdir()?;
    let warehouse = tempdir()?;
    let orchestrator = SyncOrchestrator::from_config(&config_for(sources.path(), warehouse.path())?)?;

    let err = orchestrator
        .start_sync("BANK002", "RETAIL", "CREDIT")
        .await
        .expect_err("no file delivered");
    match err {
        SyncError::SourceUnreadable(source) => assert!(source.is_not_found()),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
