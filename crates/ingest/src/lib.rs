//! Resumable ingestion engine.
//!
//! This crate provides:
//! - `PageFetcher`: one shared rate limiter, request timeouts, rate-limit backoff
//! - `CursorResolver`: resume points from stored data
//! - Pagination drivers for candles, trades and funding trades
//! - `Harvester`: the cycle loop with per-symbol failure isolation

pub mod cursor;
pub mod driver;
pub mod fetcher;
pub mod harvester;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::CursorResolver;
pub use driver::{DriverContext, DriverExit, DriverReport, FollowRules};
pub use fetcher::{rate_limiter, DirectRateLimiter, FetchPolicy, PageFetcher, PageRecord};
pub use harvester::{Clock, CycleReport, Harvester, SymbolOutcome};
pub use stats::HarvestStats;
