use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{DbArgs, RunArgs, StatusArgs};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable Bitfinex candle, trade and funding trade harvester", long_about = None)]
struct Cli {
    /// Config file path (defaults to config/Harvest.toml plus HARVEST_* env vars)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the configured streams, cycling until Ctrl+C
    Run(RunArgs),
    /// Create tables and indexes, then exit
    InitDb(DbArgs),
    /// Show stored coverage per stream and symbol
    Status(StatusArgs),
}

const DEBUG_FILTER: &str =
    "info,harvest=debug,harvest_core=debug,harvest_data=debug,harvest_bitfinex=debug,harvest_ingest=debug";

fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(debug))
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(debug))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;
    init_logging(cli.debug || config.debug, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run_harvest(args, config).await?,
        Commands::InitDb(db) => commands::run_init_db(db, config).await?,
        Commands::Status(args) => commands::run_status(args, config).await?,
    }

    Ok(())
}
