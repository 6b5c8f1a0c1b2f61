use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{error, info};

use loan_sync::domain::SyncRun;
use loan_sync::{logging, metrics, Config, SyncError, SyncOrchestrator};

#[derive(Parser)]
#[command(name = "loan-sync")]
#[command(about = "Loan portfolio CSV ingestion into per-tenant warehouse snapshots")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to LOAN_SYNC_CONFIG or loan_sync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one tenant dataset and print the run summary
    Sync {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        loan_type: String,
        #[arg(long)]
        dataset_type: String,
    },
    /// Sync every configured tenant and registered dataset kind
    SyncAll,
    /// Print the committed snapshot as JSON lines
    Snapshot {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        loan_type: String,
        #[arg(long)]
        dataset_type: String,
    },
    /// List registered dataset kinds and their target tables
    Schemas,
}

fn print_summary(run: &SyncRun) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&run.summary())?);
    Ok(())
}

async fn sync_all(orchestrator: Arc<SyncOrchestrator>) -> Result<bool> {
    let mut tasks = JoinSet::new();
    for tenant in orchestrator.tenants().tenant_codes().map(str::to_string).collect::<Vec<_>>() {
        for kind in orchestrator.registry().kinds().into_iter().cloned().collect::<Vec<_>>() {
            let orchestrator = orchestrator.clone();
            let tenant = tenant.clone();
            tasks.spawn(async move {
                let result = orchestrator
                    .start_sync(&tenant, &kind.loan_type, &kind.dataset_type)
                    .await;
                (tenant, kind, result)
            });
        }
    }

    let mut all_ok = true;
    while let Some(joined) = tasks.join_next().await {
        let (tenant, kind, result) = joined.context("sync task panicked")?;
        match result {
            Ok(run) => {
                println!(
                    "✅ {}/{}: accepted {}, rejected {}",
                    tenant, kind, run.accepted_count, run.rejected_count
                );
            }
            Err(SyncError::SourceUnreadable(e)) if e.is_not_found() => {
                info!(tenant = %tenant, kind = %kind, "No extract delivered, skipping");
            }
            Err(e) => {
                all_ok = false;
                error!(tenant = %tenant, kind = %kind, error = %e, "Sync failed");
                println!("❌ {}/{}: {}", tenant, kind, e);
            }
        }
    }
    Ok(all_ok)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;
    metrics::init_metrics();
    let orchestrator = Arc::new(SyncOrchestrator::from_config(&config)?);

    match cli.command {
        Commands::Sync {
            tenant,
            loan_type,
            dataset_type,
        } => {
            let run = orchestrator
                .start_sync(&tenant, &loan_type, &dataset_type)
                .await
                .with_context(|| format!("sync of {}/{}/{} failed", tenant, loan_type, dataset_type))?;
            print_summary(&run)?;
        }
        Commands::SyncAll => {
            if !sync_all(orchestrator).await? {
                anyhow::bail!("one or more syncs failed");
            }
        }
        Commands::Snapshot {
            tenant,
            loan_type,
            dataset_type,
        } => {
            let records = orchestrator
                .read_snapshot(&tenant, &loan_type, &dataset_type)
                .await?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            info!(records = records.len(), "Snapshot printed");
        }
        Commands::Schemas => {
            for kind in orchestrator.registry().kinds() {
                let schema = orchestrator
                    .registry()
                    .resolve(&kind.loan_type, &kind.dataset_type)?;
                println!(
                    "{:<24} {:>3} fields  -> {}",
                    kind.to_string(),
                    schema.fields.len(),
                    schema.target_table
                );
            }
        }
    }

    Ok(())
}
