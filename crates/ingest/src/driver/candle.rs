use chrono::{DateTime, Duration as ChronoDuration, Utc};
use harvest_core::Result;
use harvest_data::{CandleRecord, PageRequest};

use super::{DriverContext, DriverExit, DriverReport};

/// Fixed-size windows `[start, start + step)` from `start` until `now`.
#[derive(Debug, Clone)]
pub struct CandleWindows {
    next: DateTime<Utc>,
    step: ChronoDuration,
    now: DateTime<Utc>,
}

impl CandleWindows {
    #[must_use]
    pub fn new(start: DateTime<Utc>, step: ChronoDuration, now: DateTime<Utc>) -> Self {
        Self {
            next: start,
            step,
            now,
        }
    }
}

impl Iterator for CandleWindows {
    type Item = (DateTime<Utc>, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.now || self.step <= ChronoDuration::zero() {
            return None;
        }
        let start = self.next;
        self.next = start + self.step;
        Some((start, self.next))
    }
}

/// Walks candle windows from `start` to `now`, one request per window.
///
/// The window end is sent as the last millisecond inside the window since the
/// exchange treats `end` as inclusive.
///
/// # Errors
/// Returns the rate-limit error once retries are spent, or a storage error.
pub async fn drive_candles(
    ctx: DriverContext<'_>,
    symbol: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    step: ChronoDuration,
) -> Result<DriverReport> {
    let mut report = DriverReport::new(start);

    for (window_start, window_end) in CandleWindows::new(start, step, now) {
        let request = PageRequest::window(
            symbol,
            window_start,
            window_end - ChronoDuration::milliseconds(1),
            ctx.page_limit,
        );
        let page: Vec<CandleRecord> = ctx.fetcher.fetch(&request, &mut report.stats).await?;
        tracing::debug!(
            symbol,
            from = %window_start,
            to = %window_end,
            fetched = page.len(),
            "Fetched candles"
        );

        if !page.is_empty() {
            ctx.commit(symbol, &page, &mut report.stats).await?;
        }
        report.cursor = window_end;
    }

    report.exit = DriverExit::CaughtUp;
    Ok(report)
}
