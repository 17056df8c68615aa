//! Coverage report for the harvested tables.
//!
//! Shows, per stream and symbol, how many rows are stored, their time bounds
//! and where the next run will resume.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use harvest_core::{AppConfig, StreamKind, SymbolUniverse};
use harvest_data::{MarketStore, SymbolCoverage};
use harvest_ingest::CursorResolver;
use std::sync::Arc;

use super::{connect_store, DbArgs};

/// Arguments for the status command.
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Only report one stream (candles, trades, fundings)
    #[arg(long)]
    pub stream: Option<StreamKind>,

    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Debug)]
struct CoverageRow {
    kind: StreamKind,
    symbol: String,
    coverage: SymbolCoverage,
    resume_from: Option<DateTime<Utc>>,
}

impl CoverageRow {
    fn format_date(dt: Option<DateTime<Utc>>) -> String {
        dt.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    fn line(&self) -> String {
        format!(
            "{:<10} {:<12} {:>12} {:>22} {:>22} {:>22}",
            self.kind.to_string(),
            self.symbol,
            format_count(self.coverage.rows),
            Self::format_date(self.coverage.first),
            Self::format_date(self.coverage.last),
            Self::format_date(self.resume_from),
        )
    }
}

/// Runs the status command.
///
/// # Errors
/// Returns an error for invalid configuration, unreadable symbol files, or a
/// database that cannot be reached.
pub async fn run_status(args: StatusArgs, mut config: AppConfig) -> Result<()> {
    args.db.apply(&mut config);
    config.validate_database()?;

    let kinds: Vec<StreamKind> = match args.stream {
        Some(kind) => vec![kind],
        None => StreamKind::ALL.to_vec(),
    };
    let universe = SymbolUniverse::load(&config.universe, &kinds)?;
    let store: Arc<dyn MarketStore> = Arc::new(connect_store(&config).await?);
    let cursors = CursorResolver::new(Arc::clone(&store), config.ingest.epoch);

    let rows = collect_rows(store.as_ref(), &cursors, &universe, &kinds).await;
    print_report(&rows);

    Ok(())
}

async fn collect_rows(
    store: &dyn MarketStore,
    cursors: &CursorResolver,
    universe: &SymbolUniverse,
    kinds: &[StreamKind],
) -> Vec<CoverageRow> {
    let mut rows = Vec::new();
    for &kind in kinds {
        for symbol in universe.for_stream(kind) {
            let coverage = match store.coverage(kind, symbol).await {
                Ok(coverage) => coverage,
                Err(e) => {
                    tracing::warn!("Failed to query {} {}: {}", kind, symbol, e);
                    SymbolCoverage::default()
                }
            };
            let resume_from = match cursors.start_for(kind, symbol).await {
                Ok(start) => Some(start),
                Err(e) => {
                    tracing::warn!("Failed to resolve resume point for {} {}: {}", kind, symbol, e);
                    None
                }
            };
            rows.push(CoverageRow {
                kind,
                symbol: symbol.clone(),
                coverage,
                resume_from,
            });
        }
    }
    rows
}

fn print_report(rows: &[CoverageRow]) {
    println!();
    println!("{}", "=".repeat(106));
    println!("HARVEST STATUS");
    println!("{}", "=".repeat(106));
    println!();

    println!(
        "{:<10} {:<12} {:>12} {:>22} {:>22} {:>22}",
        "Stream", "Symbol", "Rows", "First", "Last", "Resumes from"
    );
    println!("{}", "-".repeat(106));

    for row in rows {
        println!("{}", row.line());
    }

    println!("{}", "=".repeat(106));

    let empty = rows.iter().filter(|r| r.coverage.rows == 0).count();
    if empty > 0 {
        println!("{empty} symbol(s) have no data yet and will start from the epoch");
    }
    println!();
}

fn format_count(count: i64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
