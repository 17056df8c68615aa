//! The storage seam consumed by the ingestion engine.
//!
//! A `MarketStore` answers cursor queries and accepts batches. Upserts are
//! set-based and ignore natural-key conflicts, so replaying a batch is a no-op
//! and concurrent writers need no extra locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_core::{HarvestError, StreamKind};

use crate::models::{CandleRecord, FundingTradeRecord, TradeRecord};
use crate::repositories::{Repositories, SymbolCoverage};

/// A batch of records of a single stream kind.
#[derive(Debug, Clone, Copy)]
pub enum Batch<'a> {
    Candles(&'a [CandleRecord]),
    Trades(&'a [TradeRecord]),
    FundingTrades(&'a [FundingTradeRecord]),
}

impl Batch<'_> {
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        match self {
            Batch::Candles(_) => StreamKind::Candles,
            Batch::Trades(_) => StreamKind::Trades,
            Batch::FundingTrades(_) => StreamKind::FundingTrades,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Batch::Candles(records) => records.len(),
            Batch::Trades(records) => records.len(),
            Batch::FundingTrades(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [CandleRecord]> for Batch<'a> {
    fn from(records: &'a [CandleRecord]) -> Self {
        Batch::Candles(records)
    }
}

impl<'a> From<&'a [TradeRecord]> for Batch<'a> {
    fn from(records: &'a [TradeRecord]) -> Self {
        Batch::Trades(records)
    }
}

impl<'a> From<&'a [FundingTradeRecord]> for Batch<'a> {
    fn from(records: &'a [FundingTradeRecord]) -> Self {
        Batch::FundingTrades(records)
    }
}

/// Durable storage for harvested records.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Returns the maximum stored `time` for a symbol in a stream, if any.
    async fn latest_time(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, HarvestError>;

    /// Atomically inserts a batch, ignoring rows whose natural key exists.
    ///
    /// Returns the number of newly inserted rows.
    async fn upsert(&self, symbol: &str, batch: Batch<'_>) -> Result<u64, HarvestError>;

    /// Returns stored row count and time bounds for a symbol in a stream.
    async fn coverage(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<SymbolCoverage, HarvestError>;
}

/// PostgreSQL-backed store built on the table repositories.
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    repos: Repositories,
}

impl PgMarketStore {
    #[must_use]
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

fn storage_error(err: anyhow::Error) -> HarvestError {
    HarvestError::storage(format!("{err:#}"))
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn latest_time(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, HarvestError> {
        let latest = match kind {
            StreamKind::Candles => self.repos.candles.latest_time(symbol).await,
            StreamKind::Trades => self.repos.trades.latest_time(symbol).await,
            StreamKind::FundingTrades => self.repos.funding_trades.latest_time(symbol).await,
        };
        latest.map_err(storage_error)
    }

    async fn upsert(&self, symbol: &str, batch: Batch<'_>) -> Result<u64, HarvestError> {
        let inserted = match batch {
            Batch::Candles(records) => self.repos.candles.insert_batch(records).await,
            Batch::Trades(records) => self.repos.trades.insert_batch(records).await,
            Batch::FundingTrades(records) => {
                self.repos.funding_trades.insert_batch(records).await
            }
        }
        .map_err(storage_error)?;

        tracing::debug!(
            symbol,
            table = batch.kind().table(),
            submitted = batch.len(),
            inserted,
            "Stored batch"
        );
        Ok(inserted)
    }

    async fn coverage(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> Result<SymbolCoverage, HarvestError> {
        let coverage = match kind {
            StreamKind::Candles => self.repos.candles.coverage(symbol).await,
            StreamKind::Trades => self.repos.trades.coverage(symbol).await,
            StreamKind::FundingTrades => self.repos.funding_trades.coverage(symbol).await,
        };
        coverage.map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_kind_and_len() {
        let empty: &[TradeRecord] = &[];
        let batch = Batch::from(empty);
        assert_eq!(batch.kind(), StreamKind::Trades);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_storage_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("Failed to insert trades");
        let mapped = storage_error(err);
        assert!(matches!(mapped, HarvestError::Storage(_)));
        assert_eq!(
            mapped.to_string(),
            "storage error: Failed to insert trades: connection reset"
        );
    }
}
