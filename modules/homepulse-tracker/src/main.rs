use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use homepulse_common::{Config, Location, RunKind};
use homepulse_ledger::{find_ledger, identity, LedgerRecord, LedgerStore, PgLedgerStore};
use homepulse_tracker::{ObservationBatch, RunLog, Tracker};

#[derive(Parser)]
#[command(name = "homepulse-tracker", about = "Home-listing price history tracker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one observation batch, then sweep and rebuild rollups.
    Ingest {
        /// Path to a JSON batch produced by upstream extraction.
        #[arg(long)]
        batch: PathBuf,
    },
    /// Run the archival consistency sweep and rebuild rollups.
    Sweep {
        /// Repeat every N hours instead of exiting after one pass.
        #[arg(long)]
        interval_hours: Option<u64>,
    },
    /// Print an entity's ledger (live or archived) by natural key.
    Show {
        #[arg(long)]
        natural_key: String,
    },
    /// Print the latest rollup for a geography tuple.
    Region {
        #[arg(long)]
        locality: String,
        #[arg(long)]
        county: String,
        #[arg(long)]
        region: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("homepulse=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = Arc::new(PgLedgerStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let tracker = Tracker::new(store.clone(), &config);

    match cli.command {
        Command::Ingest { batch } => {
            let source = ObservationBatch::load(&batch)?.into_source();
            let mut run_log = RunLog::new(uuid::Uuid::new_v4().to_string(), RunKind::Ingest);
            let stats = tracker.run_ingest(&source, &mut run_log).await?;
            run_log.save(&stats)?;
            println!("{stats}");
        }
        Command::Sweep { interval_hours } => match interval_hours {
            None => {
                let mut run_log = RunLog::new(uuid::Uuid::new_v4().to_string(), RunKind::Sweep);
                let stats = tracker.run_sweep(&mut run_log).await?;
                run_log.save(&stats)?;
                println!("{stats}");
            }
            Some(hours) => loop {
                let mut run_log = RunLog::new(uuid::Uuid::new_v4().to_string(), RunKind::Sweep);
                // A failed pass is retried on the next tick, not fatal.
                match tracker.run_sweep(&mut run_log).await {
                    Ok(stats) => {
                        run_log.save(&stats)?;
                        info!("{stats}");
                    }
                    Err(e) => error!(error = %e, "Sweep failed, will retry next interval"),
                }
                tokio::time::sleep(Duration::from_secs(hours * 3600)).await;
            },
        },
        Command::Show { natural_key } => {
            let entity_id = identity::entity_id(&natural_key)?;
            match find_ledger(store.as_ref(), &entity_id).await? {
                Some(LedgerRecord::Live(ledger)) => {
                    println!("{}", serde_json::to_string_pretty(&ledger)?);
                }
                Some(LedgerRecord::Archived(record)) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => println!("No ledger for: {natural_key}"),
            }
        }
        Command::Region {
            locality,
            county,
            region,
        } => {
            let location = Location {
                locality,
                county,
                region,
            };
            let region_id = identity::region_id(&location);
            match store.get_rollup(&region_id).await? {
                Some(rollup) => println!("{}", serde_json::to_string_pretty(&rollup)?),
                None => println!("No rollup for: {}, {}", location.locality, location.county),
            }
        }
    }

    Ok(())
}
