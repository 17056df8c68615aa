//! The `run` command: harvest until interrupted.

use anyhow::{bail, Context, Result};
use clap::Args;
use harvest_bitfinex::BitfinexClient;
use harvest_core::{AppConfig, StreamsConfig, SymbolUniverse};
use harvest_data::{MarketStore, MemoryStore};
use harvest_ingest::{FetchPolicy, Harvester, PageFetcher};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{connect_store, DbArgs};

/// Arguments for the run command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run a single cycle, then exit
    #[arg(long)]
    pub once: bool,

    /// Harvest 1-minute candles
    #[arg(long)]
    pub includecandles: bool,

    /// Harvest funding trades
    #[arg(long)]
    pub includefundings: bool,

    /// Harvest trades
    #[arg(long)]
    pub includetradings: bool,

    /// Keep everything in memory instead of writing to the database
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub db: DbArgs,
}

impl RunArgs {
    fn any_include(&self) -> bool {
        self.includecandles || self.includefundings || self.includetradings
    }

    /// Applies the flags on top of the loaded configuration.
    ///
    /// With no `--include*` flag the configured stream selection stands.
    pub fn apply(&self, config: &mut AppConfig) {
        self.db.apply(config);
        if self.any_include() {
            config.streams = StreamsConfig {
                candles: self.includecandles,
                trades: self.includetradings,
                fundings: self.includefundings,
            };
        }
    }
}

/// Runs the harvester.
///
/// # Errors
/// Returns an error for invalid configuration, unreadable symbol files, or a
/// database that cannot be reached at start-up.
pub async fn run_harvest(args: RunArgs, mut config: AppConfig) -> Result<()> {
    args.apply(&mut config);
    if args.dry_run {
        config.validate_ingest()?;
    } else {
        config.validate()?;
    }

    let streams = config.streams.enabled();
    if streams.is_empty() {
        bail!("No stream enabled; pass --includecandles, --includefundings or --includetradings");
    }
    tracing::info!(
        "Harvesting {}",
        streams
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let universe = SymbolUniverse::load(&config.universe, &streams)?;

    let store: Arc<dyn MarketStore> = if args.dry_run {
        tracing::warn!("Dry run: records are kept in memory and discarded on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(connect_store(&config).await?)
    };

    let client = BitfinexClient::from_config(&config.source)?;
    tracing::info!("Using Bitfinex API at {}", client.base_url());
    let fetcher = PageFetcher::new(Arc::new(client), FetchPolicy::from_config(&config.source))
        .context("Failed to set up the request limiter")?;

    let harvester = Harvester::new(fetcher, store, universe, &config);

    let stop = harvester.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing in-flight symbols");
            stop.store(true, Ordering::SeqCst);
        }
    });

    if args.once {
        let report = harvester.run_cycle().await;
        tracing::info!("Cycle complete. {}", report.summary());
    } else {
        let cycles = harvester.run_forever().await;
        tracing::info!(cycles, "Harvester stopped");
    }

    Ok(())
}
