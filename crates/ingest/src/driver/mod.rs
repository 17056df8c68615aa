//! Pagination drivers, one per stream kind.
//!
//! A driver takes a symbol from a resolved cursor up to a captured `now`.
//! Every iteration either commits records while moving the cursor strictly
//! forward, or advances the cursor by the stream's minimum step. Funding
//! passes may also end early when the cursor stops making progress.

mod candle;
mod follow;

pub use candle::{drive_candles, CandleWindows};
pub use follow::{drive_follow, drive_fundings, drive_trades, next_cursor, Advance, FollowRules};

use chrono::{DateTime, Utc};
use harvest_core::Result;
use harvest_data::MarketStore;

use crate::fetcher::{PageFetcher, PageRecord};
use crate::stats::HarvestStats;

/// What a driver needs from the outside world.
#[derive(Clone, Copy)]
pub struct DriverContext<'a> {
    pub fetcher: &'a PageFetcher,
    pub store: &'a dyn MarketStore,
    pub page_limit: usize,
}

impl DriverContext<'_> {
    async fn commit<R: PageRecord>(
        &self,
        symbol: &str,
        records: &[R],
        stats: &mut HarvestStats,
    ) -> Result<()> {
        stats.inserted += self.store.upsert(symbol, R::batch(records)).await?;
        Ok(())
    }
}

/// Why a symbol pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// The cursor reached the captured `now`.
    CaughtUp,
    /// Two consecutive cursors were closer than the minimum progress.
    NoProgress,
}

/// Outcome of one symbol pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReport {
    pub start: DateTime<Utc>,
    /// Cursor after the last iteration.
    pub cursor: DateTime<Utc>,
    pub exit: DriverExit,
    pub stats: HarvestStats,
}

impl DriverReport {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            cursor: start,
            exit: DriverExit::CaughtUp,
            stats: HarvestStats::new(),
        }
    }
}
