//! Command-line interface for pg-replicator
//!
//! # Usage Examples
//!
//! ## Replicate
//! ```bash
//! # Copy existing rows, then apply changes every 2 seconds
//! pg-replicator run \
//!   --source-url "host=localhost port=5429 user=postgres password=postgres dbname=testdb" \
//!   --target-url "host=localhost port=5431 user=postgres password=postgres dbname=testdb" \
//!   --slot migration_slot \
//!   --ledger-dir .pg-replicator-ledger --monitor
//! ```
//!
//! ## Failure ledger
//! ```bash
//! pg-replicator ledger list --ledger-dir .pg-replicator-ledger
//! pg-replicator ledger replay --ledger-dir .pg-replicator-ledger \
//!   --target-url "host=localhost port=5431 user=postgres password=postgres dbname=testdb"
//! ```
//!
//! ## Slot cleanup
//! ```bash
//! # The slot holds WAL on the source until it is dropped
//! pg-replicator slot drop --slot migration_slot
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use ledger::Ledger;
use pg_replicator::config::{parse_duration, SourceArgs, TableArgs, TargetArgs};
use pg_replicator::connect::{connect, set_statement_timeout};
use pg_replicator::{replay_ledger, replicator, ReplicatorConfig, RunArgs};
use postgresql_sink::PostgreSQLSink;
use postgresql_wal2json_source::{validate_slot_name, Client as SlotClient};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "pg_replicator=info,postgresql_wal2json_source=info,postgresql_sink=info,ledger=info";

#[derive(Parser)]
#[command(name = "pg-replicator")]
#[command(about = "Replicate a PostgreSQL table through a wal2json logical decoding slot")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk load the table, then apply changes from the slot until Ctrl+C
    Run(RunArgs),

    /// Inspect or replay changes that failed after being consumed
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },

    /// Manage the replication slot
    Slot {
        #[command(subcommand)]
        command: SlotCommand,
    },
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// Print pending entries as JSON lines, oldest first
    List {
        /// Ledger directory
        #[arg(long, env = "LEDGER_DIR")]
        ledger_dir: PathBuf,
    },

    /// Apply pending entries to the target and remove those that succeed
    Replay {
        /// Ledger directory
        #[arg(long, env = "LEDGER_DIR")]
        ledger_dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        table: TableArgs,

        /// Upper bound on any single call to the target
        #[arg(long, env = "IO_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
        io_timeout: Duration,
    },
}

#[derive(Subcommand)]
enum SlotCommand {
    /// Drop the slot and release the WAL it retains
    Drop {
        #[command(flatten)]
        source: SourceArgs,

        /// Name of the logical replication slot
        #[arg(long, env = "SLOT_NAME", default_value = "migration_slot")]
        slot: String,

        /// Upper bound on connecting to the source
        #[arg(long, env = "IO_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
        io_timeout: Duration,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = ReplicatorConfig::try_from(args)?;
            let shutdown = replicator::setup_shutdown_handler();
            replicator::run(&config, shutdown).await?;
        }
        Commands::Ledger { command } => match command {
            LedgerCommand::List { ledger_dir } => list_ledger(ledger_dir).await?,
            LedgerCommand::Replay {
                ledger_dir,
                target,
                table,
                io_timeout,
            } => run_ledger_replay(ledger_dir, target, table, io_timeout).await?,
        },
        Commands::Slot { command } => match command {
            SlotCommand::Drop {
                source,
                slot,
                io_timeout,
            } => drop_slot(source, &slot, io_timeout).await?,
        },
    }

    Ok(())
}

async fn list_ledger(ledger_dir: PathBuf) -> anyhow::Result<()> {
    let entries = Ledger::filesystem(&ledger_dir)
        .pending()
        .await
        .with_context(|| format!("Failed to read ledger at {ledger_dir:?}"))?;
    for entry in &entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    info!("{} pending ledger entries in {ledger_dir:?}", entries.len());
    Ok(())
}

async fn run_ledger_replay(
    ledger_dir: PathBuf,
    target: TargetArgs,
    table: TableArgs,
    io_timeout: Duration,
) -> anyhow::Result<()> {
    let client = connect(&target.config()?, "target", io_timeout).await?;
    set_statement_timeout(&client, "target", io_timeout).await?;
    let sink = PostgreSQLSink::new(client, table.table_schema());
    let stats = replay_ledger(&Ledger::filesystem(ledger_dir), &sink, io_timeout).await?;
    info!(
        "Ledger replay finished: {} resolved, {} remaining",
        stats.resolved, stats.remaining
    );
    Ok(())
}

async fn drop_slot(source: SourceArgs, slot: &str, io_timeout: Duration) -> anyhow::Result<()> {
    validate_slot_name(slot)?;
    let client = SlotClient::from_shared(connect(&source.config()?, "source", io_timeout).await?);
    if client.slot_exists(slot).await? {
        client.drop_slot(slot).await?;
    } else {
        info!("Replication slot '{slot}' does not exist, nothing to drop");
    }
    Ok(())
}
