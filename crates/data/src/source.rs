//! The market-data source seam.
//!
//! A source answers one bounded page request per call. Rate limiting,
//! retries and timeouts are applied by the caller, not by implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_core::HarvestError;

use crate::models::{CandleRecord, FundingTradeRecord, TradeRecord};

/// Order in which the source returns a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

impl SortOrder {
    /// Value of the `sort` query parameter.
    #[must_use]
    pub const fn as_param(&self) -> i8 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// One bounded page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub symbol: String,
    pub start: DateTime<Utc>,
    /// Only used by windowed streams.
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub sort: SortOrder,
}

impl PageRequest {
    /// Ascending request for everything from `start`.
    pub fn starting_at(symbol: impl Into<String>, start: DateTime<Utc>, limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end: None,
            limit,
            sort: SortOrder::Ascending,
        }
    }

    /// Ascending request bounded by `[start, end]`.
    pub fn window(
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Self {
        Self {
            end: Some(end),
            ..Self::starting_at(symbol, start, limit)
        }
    }
}

/// A paginated, read-only market-data API.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn candles(&self, request: &PageRequest) -> Result<Vec<CandleRecord>, HarvestError>;

    async fn trades(&self, request: &PageRequest) -> Result<Vec<TradeRecord>, HarvestError>;

    async fn funding_trades(
        &self,
        request: &PageRequest,
    ) -> Result<Vec<FundingTradeRecord>, HarvestError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_request() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::minutes(1000);
        let request = PageRequest::window("btcusd", start, end, 1000);

        assert_eq!(request.end, Some(end));
        assert_eq!(request.sort, SortOrder::Ascending);
        assert_eq!(request.sort.as_param(), 1);
        assert_eq!(SortOrder::Descending.as_param(), -1);
    }
}
