//! Storage for harvested market data.
//!
//! This crate provides:
//! - Record models for candles, trades and funding trades
//! - PostgreSQL schema management and connection pooling
//! - Repositories with set-based, conflict-ignoring batch inserts
//! - The `MarketStore` seam with PostgreSQL and in-memory implementations
//! - The `MarketDataSource` seam implemented by exchange clients

pub mod database;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod sink;
pub mod source;

pub use database::Database;
pub use memory::MemoryStore;
pub use models::{CandleRecord, FundingTradeRecord, Timestamped, TradeRecord};
pub use repositories::{
    CandleRepository, FundingTradeRepository, Repositories, SymbolCoverage, TradeRepository,
};
pub use sink::{Batch, MarketStore, PgMarketStore};
pub use source::{MarketDataSource, PageRequest, SortOrder};
