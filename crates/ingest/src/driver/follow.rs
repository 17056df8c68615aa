//! Cursor-follows-data pagination for trades and funding trades.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use harvest_core::{IngestConfig, Result};
use harvest_data::{FundingTradeRecord, PageRequest, TradeRecord};

use super::{DriverContext, DriverExit, DriverReport};
use crate::fetcher::PageRecord;

/// Step sizes and termination for a cursor-following stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowRules {
    /// Cursor advance after an empty page.
    pub empty_step: ChronoDuration,
    /// Resolution of the exchange's search timestamp.
    pub coarse_unit: ChronoDuration,
    /// Ends the pass when two consecutive cursors are closer than this.
    pub min_progress: Option<ChronoDuration>,
}

impl FollowRules {
    #[must_use]
    pub fn trades(config: &IngestConfig) -> Self {
        Self {
            empty_step: config.trade_empty_step(),
            coarse_unit: config.coarse_unit(),
            min_progress: None,
        }
    }

    #[must_use]
    pub fn fundings(config: &IngestConfig) -> Self {
        Self {
            empty_step: config.funding_empty_step(),
            coarse_unit: config.coarse_unit(),
            min_progress: Some(config.funding_min_progress()),
        }
    }
}

/// How the cursor moved after a non-empty page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the last record's time.
    Followed,
    /// A full page fit inside one coarse unit; skipped past that instant.
    Saturated,
    /// The page did not move the cursor; forced forward one coarse unit.
    Stalled,
}

/// Next cursor after a non-empty page spanning `first..=last`.
#[must_use]
pub fn next_cursor(
    cursor: DateTime<Utc>,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    len: usize,
    limit: usize,
    coarse_unit: ChronoDuration,
) -> (DateTime<Utc>, Advance) {
    if len >= limit && last - first < coarse_unit {
        let next = last + coarse_unit;
        if next > cursor {
            return (next, Advance::Saturated);
        }
    } else if last > cursor {
        return (last, Advance::Followed);
    }
    (cursor + coarse_unit, Advance::Stalled)
}

/// Follows a stream's data from `start` until `now`.
///
/// # Errors
/// Returns the rate-limit error once retries are spent, or a storage error.
pub async fn drive_follow<R: PageRecord>(
    ctx: DriverContext<'_>,
    symbol: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    rules: FollowRules,
) -> Result<DriverReport> {
    let mut report = DriverReport::new(start);
    let mut cursor = start;
    let mut previous = cursor - ChronoDuration::days(1);
    // Saturated jumps are exempt from the minimum-progress check.
    let mut skipped_instant = false;

    report.exit = loop {
        if cursor >= now {
            break DriverExit::CaughtUp;
        }
        if let Some(min_progress) = rules.min_progress {
            if !skipped_instant && cursor - previous < min_progress {
                break DriverExit::NoProgress;
            }
        }

        let request = PageRequest::starting_at(symbol, cursor, ctx.page_limit);
        let page: Vec<R> = ctx.fetcher.fetch(&request, &mut report.stats).await?;
        tracing::debug!(symbol, stream = %R::KIND, %cursor, fetched = page.len(), "Fetched page");

        previous = cursor;
        skipped_instant = false;
        cursor = match (page.first(), page.last()) {
            (Some(first), Some(last)) => {
                ctx.commit(symbol, &page, &mut report.stats).await?;
                let (next, advance) = next_cursor(
                    cursor,
                    first.time(),
                    last.time(),
                    page.len(),
                    ctx.page_limit,
                    rules.coarse_unit,
                );
                if advance == Advance::Saturated {
                    skipped_instant = true;
                    tracing::warn!(
                        symbol,
                        stream = %R::KIND,
                        instant = %last.time(),
                        "Full page within one coarse unit, skipping ahead"
                    );
                }
                next
            }
            _ => cursor + rules.empty_step,
        };
        report.cursor = cursor;
    };

    Ok(report)
}

/// Trade pass: empty pages advance by the trade empty step.
///
/// # Errors
/// See [`drive_follow`].
pub async fn drive_trades(
    ctx: DriverContext<'_>,
    symbol: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &IngestConfig,
) -> Result<DriverReport> {
    drive_follow::<TradeRecord>(ctx, symbol, start, now, FollowRules::trades(config)).await
}

/// Funding pass: larger empty step and minimum-progress termination.
///
/// # Errors
/// See [`drive_follow`].
pub async fn drive_fundings(
    ctx: DriverContext<'_>,
    symbol: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &IngestConfig,
) -> Result<DriverReport> {
    drive_follow::<FundingTradeRecord>(ctx, symbol, start, now, FollowRules::fundings(config))
        .await
}
