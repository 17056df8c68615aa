//! Synthetic source used by the engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use harvest_core::{HarvestError, StreamKind};
use harvest_data::{
    CandleRecord, FundingTradeRecord, MarketDataSource, PageRequest, Timestamped, TradeRecord,
};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::FetchPolicy;

pub(crate) fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        request_interval: Duration::from_millis(1),
        timeout: Duration::from_secs(2),
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(4),
        max_rate_limit_retries: 5,
    }
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

pub(crate) fn candle(symbol: &str, time: DateTime<Utc>) -> CandleRecord {
    CandleRecord {
        symbol: symbol.to_string(),
        time,
        open: dec!(100),
        close: dec!(101),
        high: dec!(102),
        low: dec!(99),
        volume: dec!(1.5),
    }
}

pub(crate) fn trade(symbol: &str, id: i64, time: DateTime<Utc>) -> TradeRecord {
    TradeRecord {
        symbol: symbol.to_string(),
        id,
        time,
        amount: dec!(0.01),
        price: dec!(62000),
    }
}

pub(crate) fn funding(symbol: &str, id: i64, time: DateTime<Utc>) -> FundingTradeRecord {
    FundingTradeRecord {
        symbol: symbol.to_string(),
        id,
        time,
        amount: dec!(1000),
        rate: dec!(0.0002),
        period: 2,
    }
}

/// One candle per minute over `[from, from + minutes)`.
pub(crate) fn minute_candles(symbol: &str, from: DateTime<Utc>, minutes: i64) -> Vec<CandleRecord> {
    (0..minutes)
        .map(|i| candle(symbol, from + ChronoDuration::minutes(i)))
        .collect()
}

/// Trades spaced `gap` apart, ids starting at `first_id`.
pub(crate) fn spaced_trades(
    symbol: &str,
    first_id: i64,
    from: DateTime<Utc>,
    gap: ChronoDuration,
    n: i64,
) -> Vec<TradeRecord> {
    (0..n)
        .map(|i| trade(symbol, first_id + i, from + gap * i as i32))
        .collect()
}

#[derive(Default)]
struct Script {
    candles: HashMap<String, Vec<CandleRecord>>,
    trades: HashMap<String, Vec<TradeRecord>>,
    fundings: HashMap<String, Vec<FundingTradeRecord>>,
    throttle: u32,
    fail: u32,
    latency: Option<Duration>,
    horizon: Option<DateTime<Utc>>,
    requests: Vec<(StreamKind, PageRequest)>,
    stop_after: Option<(usize, Arc<AtomicBool>)>,
}

/// A `MarketDataSource` that answers from in-memory data the way the
/// exchange does: ascending from `start`, bounded by `end` when given,
/// truncated to `limit`.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_candles(&self, records: Vec<CandleRecord>) {
        let mut script = self.script.lock();
        for record in records {
            script
                .candles
                .entry(record.symbol.clone())
                .or_default()
                .push(record);
        }
        for rows in script.candles.values_mut() {
            rows.sort_by_key(|r| r.time);
        }
    }

    pub(crate) fn add_trades(&self, records: Vec<TradeRecord>) {
        let mut script = self.script.lock();
        for record in records {
            script
                .trades
                .entry(record.symbol.clone())
                .or_default()
                .push(record);
        }
        for rows in script.trades.values_mut() {
            rows.sort_by_key(|r| (r.time, r.id));
        }
    }

    pub(crate) fn add_fundings(&self, records: Vec<FundingTradeRecord>) {
        let mut script = self.script.lock();
        for record in records {
            script
                .fundings
                .entry(record.symbol.clone())
                .or_default()
                .push(record);
        }
        for rows in script.fundings.values_mut() {
            rows.sort_by_key(|r| (r.time, r.id));
        }
    }

    /// The next `n` requests answer with a rate-limit error.
    pub(crate) fn throttle_next(&self, n: u32) {
        self.script.lock().throttle = n;
    }

    /// The next `n` requests answer with a transport error.
    pub(crate) fn fail_next(&self, n: u32) {
        self.script.lock().fail = n;
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = Some(latency);
    }

    /// Hides every record at or after `at`, as if it had not happened yet.
    pub(crate) fn publish_until(&self, at: DateTime<Utc>) {
        self.script.lock().horizon = Some(at);
    }

    /// Raises `flag` once `n` requests have been served.
    pub(crate) fn stop_after(&self, n: usize, flag: Arc<AtomicBool>) {
        self.script.lock().stop_after = Some((n, flag));
    }

    pub(crate) fn requests(&self) -> Vec<(StreamKind, PageRequest)> {
        self.script.lock().requests.clone()
    }

    pub(crate) fn requests_for(&self, kind: StreamKind, symbol: &str) -> Vec<PageRequest> {
        self.requests()
            .into_iter()
            .filter(|(k, r)| *k == kind && r.symbol == symbol)
            .map(|(_, r)| r)
            .collect()
    }

    /// Records the request and applies scripted failures.
    async fn enter(&self, kind: StreamKind, request: &PageRequest) -> Result<(), HarvestError> {
        let latency = {
            let mut script = self.script.lock();
            script.requests.push((kind, request.clone()));
            if let Some((n, flag)) = &script.stop_after {
                if script.requests.len() >= *n {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            if script.throttle > 0 {
                script.throttle -= 1;
                return Err(HarvestError::rate_limit(None));
            }
            if script.fail > 0 {
                script.fail -= 1;
                return Err(HarvestError::transport("connection reset by peer"));
            }
            script.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

fn page<R: Timestamped + Clone>(
    rows: Option<&Vec<R>>,
    horizon: Option<DateTime<Utc>>,
    request: &PageRequest,
) -> Vec<R> {
    rows.map(|rows| {
        rows.iter()
            .filter(|r| horizon.map_or(true, |h| r.time() < h))
            .filter(|r| r.time() >= request.start)
            .filter(|r| request.end.map_or(true, |end| r.time() <= end))
            .take(request.limit)
            .cloned()
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn candles(&self, request: &PageRequest) -> Result<Vec<CandleRecord>, HarvestError> {
        self.enter(StreamKind::Candles, request).await?;
        let script = self.script.lock();
        Ok(page(script.candles.get(&request.symbol), script.horizon, request))
    }

    async fn trades(&self, request: &PageRequest) -> Result<Vec<TradeRecord>, HarvestError> {
        self.enter(StreamKind::Trades, request).await?;
        let script = self.script.lock();
        Ok(page(script.trades.get(&request.symbol), script.horizon, request))
    }

    async fn funding_trades(
        &self,
        request: &PageRequest,
    ) -> Result<Vec<FundingTradeRecord>, HarvestError> {
        self.enter(StreamKind::FundingTrades, request).await?;
        let script = self.script.lock();
        Ok(page(script.fundings.get(&request.symbol), script.horizon, request))
    }
}
