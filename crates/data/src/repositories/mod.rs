//! Database repositories for the harvested streams.
//!
//! Each repository provides typed access to one table with set-based,
//! conflict-ignoring batch inserts and cursor queries.

pub mod candle_repo;
pub mod funding_trade_repo;
pub mod trade_repo;

pub use candle_repo::CandleRepository;
pub use funding_trade_repo::FundingTradeRepository;
pub use trade_repo::TradeRepository;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Rows per multi-row INSERT statement.
pub(crate) const INSERT_CHUNK_SIZE: usize = 1_000;

/// Stored row count and time bounds for one symbol in one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolCoverage {
    pub rows: i64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub candles: CandleRepository,
    pub trades: TradeRepository,
    pub funding_trades: FundingTradeRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            candles: CandleRepository::new(pool.clone()),
            trades: TradeRepository::new(pool.clone()),
            funding_trades: FundingTradeRepository::new(pool),
        }
    }
}

/// A pool whose every acquire fails: nothing listens on port 1.
#[cfg(test)]
pub(crate) fn unreachable_pool() -> PgPool {
    sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(500))
        .connect_lazy("postgres://harvest@127.0.0.1:1/harvest")
        .unwrap()
}
