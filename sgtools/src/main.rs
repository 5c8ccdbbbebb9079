//! Command-line entry points for the supply gateway's batch jobs.

use clap::{Parser, Subcommand};
use supply_sync_engine::SyncConfig;

mod commands;

use commands::{push_stocks, sync_supplies, sync_supply_one};

#[derive(Parser, Debug)]
#[command(version, about = "Marketplace supply orders ↔ ERP document chain, reconciled in batch")]
pub struct Arguments {
    /// Log every intended mutation, perform none. Overrides SG_DRY_RUN.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile every supply order of every configured cabinet
    #[clap(name = "sync-supplies")]
    SyncSupplies,
    /// Reconcile a single supply order by its marketplace id
    #[clap(name = "sync-supply")]
    SyncSupply {
        #[arg(required = true, index = 1)]
        order_id: i64,
        /// The cabinet (1-based index) the order belongs to
        #[arg(short = 'c', long = "cabinet", default_value = "1")]
        cabinet: usize,
    },
    /// Publish ERP stock availability back to the marketplace cabinets
    #[clap(name = "push-stocks")]
    PushStocks,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Arguments::parse();
    let mut config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // the one condition that exits non-zero: a batch must never start half-configured
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        },
    };
    if cli.dry_run {
        config.dry_run = true;
    }
    match cli.command {
        Command::SyncSupplies => sync_supplies(&config).await,
        Command::SyncSupply { order_id, cabinet } => sync_supply_one(&config, order_id, cabinet).await,
        Command::PushStocks => push_stocks(&config).await,
    }
}
