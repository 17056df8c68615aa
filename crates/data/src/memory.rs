//! In-memory `MarketStore`.
//!
//! Enforces the same natural keys as the PostgreSQL schema. Used by the
//! ingestion engine's tests and by `harvest run --dry-run`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_core::{HarvestError, StreamKind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use crate::models::{CandleRecord, FundingTradeRecord, TradeRecord};
use crate::repositories::SymbolCoverage;
use crate::sink::{Batch, MarketStore};

#[derive(Debug, Default)]
struct Tables {
    candles: BTreeMap<(String, DateTime<Utc>), CandleRecord>,
    trades: BTreeMap<i64, TradeRecord>,
    funding_trades: BTreeMap<(String, DateTime<Utc>), FundingTradeRecord>,
    failing_symbols: HashSet<String>,
    failing_reads: bool,
    upserts: u64,
}

/// A store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write for `symbol` fail with a storage error.
    pub fn fail_writes_for(&self, symbol: impl Into<String>) {
        self.tables.lock().failing_symbols.insert(symbol.into());
    }

    /// Lets writes for `symbol` succeed again.
    pub fn heal(&self, symbol: &str) {
        self.tables.lock().failing_symbols.remove(symbol);
    }

    /// Makes every cursor and coverage query fail with a storage error.
    pub fn fail_reads(&self) {
        self.tables.lock().failing_reads = true;
    }

    /// Number of rows stored for a stream, across all symbols.
    #[must_use]
    pub fn row_count(&self, kind: StreamKind) -> usize {
        let tables = self.tables.lock();
        match kind {
            StreamKind::Candles => tables.candles.len(),
            StreamKind::Trades => tables.trades.len(),
            StreamKind::FundingTrades => tables.funding_trades.len(),
        }
    }

    /// Number of successful upsert calls, including no-op replays.
    #[must_use]
    pub fn upsert_calls(&self) -> u64 {
        self.tables.lock().upserts
    }

    /// Stored candles for a symbol, oldest first.
    #[must_use]
    pub fn candles(&self, symbol: &str) -> Vec<CandleRecord> {
        self.tables
            .lock()
            .candles
            .values()
            .filter(|c| c.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Stored trades for a symbol, oldest first.
    #[must_use]
    pub fn trades(&self, symbol: &str) -> Vec<TradeRecord> {
        let mut trades: Vec<TradeRecord> = self
            .tables
            .lock()
            .trades
            .values()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect();
        trades.sort_by_key(|t| (t.time, t.id));
        trades
    }

    /// Stored funding trades for a symbol, oldest first.
    #[must_use]
    pub fn funding_trades(&self, symbol: &str) -> Vec<FundingTradeRecord> {
        self.tables
            .lock()
            .funding_trades
            .values()
            .filter(|f| f.symbol == symbol)
            .cloned()
            .collect()
    }
}

fn times_for<'a>(
    tables: &'a Tables,
    kind: StreamKind,
    symbol: &'a str,
) -> Box<dyn Iterator<Item = DateTime<Utc>> + 'a> {
    match kind {
        StreamKind::Candles => Box::new(
            tables
                .candles
                .values()
                .filter(move |c| c.symbol == symbol)
                .map(|c| c.time),
        ),
        StreamKind::Trades => Box::new(
            tables
                .trades
                .values()
                .filter(move |t| t.symbol == symbol)
                .map(|t| t.time),
        ),
        StreamKind::FundingTrades => Box::new(
            tables
                .funding_trades
                .values()
                .filter(move |f| f.symbol == symbol)
                .map(|f| f.time),
        ),
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn latest_time(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, HarvestError> {
        let tables = self.tables.lock();
        if tables.failing_reads {
            return Err(HarvestError::storage("simulated read failure"));
        }
        Ok(times_for(&tables, kind, symbol).max())
    }

    async fn upsert(&self, symbol: &str, batch: Batch<'_>) -> Result<u64, HarvestError> {
        let mut tables = self.tables.lock();
        if tables.failing_symbols.contains(symbol) {
            return Err(HarvestError::storage(format!(
                "simulated write failure for {symbol}"
            )));
        }

        let before = match batch.kind() {
            StreamKind::Candles => tables.candles.len(),
            StreamKind::Trades => tables.trades.len(),
            StreamKind::FundingTrades => tables.funding_trades.len(),
        };

        match batch {
            Batch::Candles(records) => {
                for record in records {
                    tables
                        .candles
                        .entry((record.symbol.clone(), record.time))
                        .or_insert_with(|| record.clone());
                }
            }
            Batch::Trades(records) => {
                for record in records {
                    tables
                        .trades
                        .entry(record.id)
                        .or_insert_with(|| record.clone());
                }
            }
            Batch::FundingTrades(records) => {
                for record in records {
                    tables
                        .funding_trades
                        .entry((record.symbol.clone(), record.time))
                        .or_insert_with(|| record.clone());
                }
            }
        }

        let after = match batch.kind() {
            StreamKind::Candles => tables.candles.len(),
            StreamKind::Trades => tables.trades.len(),
            StreamKind::FundingTrades => tables.funding_trades.len(),
        };
        tables.upserts += 1;

        Ok((after - before) as u64)
    }

    async fn coverage(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<SymbolCoverage, HarvestError> {
        let tables = self.tables.lock();
        if tables.failing_reads {
            return Err(HarvestError::storage("simulated read failure"));
        }
        let mut coverage = SymbolCoverage::default();
        for time in times_for(&tables, kind, symbol) {
            coverage.rows += 1;
            coverage.first = Some(coverage.first.map_or(time, |t| t.min(time)));
            coverage.last = Some(coverage.last.map_or(time, |t| t.max(time)));
        }
        Ok(coverage)
    }
}
