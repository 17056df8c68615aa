//! The ingestion loop.
//!
//! One cycle walks every enabled stream kind (candles, fundings, trades) over
//! its symbol universe. Each symbol pass resolves its cursor from storage,
//! captures `now` and runs the stream's driver to exhaustion. A failing symbol
//! is logged and retried next cycle; the rest of the cycle carries on.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use harvest_core::{AppConfig, HarvestError, IngestConfig, StreamKind, SymbolUniverse};
use harvest_data::MarketStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::CursorResolver;
use crate::driver::{drive_candles, drive_fundings, drive_trades, DriverContext, DriverReport};
use crate::fetcher::PageFetcher;
use crate::stats::HarvestStats;

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome of one symbol pass.
#[derive(Debug)]
pub enum SymbolOutcome {
    Completed(DriverReport),
    Failed(HarvestError),
    /// The stop flag was raised before the pass started.
    Skipped,
}

/// Totals for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stats: HarvestStats,
}

impl CycleReport {
    fn record(&mut self, outcome: &SymbolOutcome) {
        match outcome {
            SymbolOutcome::Completed(report) => {
                self.completed += 1;
                self.stats += report.stats;
            }
            SymbolOutcome::Failed(_) => self.failed += 1,
            SymbolOutcome::Skipped => self.skipped += 1,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Symbols: {} done, {} failed, {} skipped | {}",
            self.completed,
            self.failed,
            self.skipped,
            self.stats.summary()
        )
    }
}

/// Runs harvest cycles over a symbol universe.
pub struct Harvester {
    fetcher: PageFetcher,
    store: Arc<dyn MarketStore>,
    cursors: CursorResolver,
    universe: SymbolUniverse,
    streams: Vec<StreamKind>,
    ingest: IngestConfig,
    page_limit: usize,
    stop: Arc<AtomicBool>,
    clock: Clock,
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("streams", &self.streams)
            .field("workers", &self.ingest.workers)
            .field("page_limit", &self.page_limit)
            .finish_non_exhaustive()
    }
}

impl Harvester {
    #[must_use]
    pub fn new(
        fetcher: PageFetcher,
        store: Arc<dyn MarketStore>,
        universe: SymbolUniverse,
        config: &AppConfig,
    ) -> Self {
        let cursors = CursorResolver::new(Arc::clone(&store), config.ingest.epoch);
        Self {
            fetcher,
            store,
            cursors,
            universe,
            streams: config.streams.enabled(),
            ingest: config.ingest.clone(),
            page_limit: config.source.page_limit,
            stop: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Flag that ends the loop once the in-flight symbol passes complete.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn context(&self) -> DriverContext<'_> {
        DriverContext {
            fetcher: &self.fetcher,
            store: self.store.as_ref(),
            page_limit: self.page_limit,
        }
    }

    /// Runs one full cycle over every enabled stream.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for &kind in &self.streams {
            let symbols = self.universe.for_stream(kind);
            let total = symbols.len();
            let workers = self.ingest.workers.max(1);

            let outcomes: Vec<SymbolOutcome> = stream::iter(symbols.iter().enumerate())
                .map(|(i, symbol)| self.run_symbol(kind, i + 1, total, symbol))
                .buffered(workers)
                .collect()
                .await;

            for outcome in &outcomes {
                report.record(outcome);
            }
            if self.stopping() {
                break;
            }
        }

        report
    }

    /// Runs one symbol pass, isolating its failures.
    pub async fn run_symbol(
        &self,
        kind: StreamKind,
        index: usize,
        total: usize,
        symbol: &str,
    ) -> SymbolOutcome {
        if self.stopping() {
            return SymbolOutcome::Skipped;
        }

        let start = match self.cursors.start_for(kind, symbol).await {
            Ok(start) => start,
            Err(err) => {
                tracing::warn!(symbol, stream = %kind, error = %err, "Cannot resolve cursor, skipping symbol");
                return SymbolOutcome::Failed(err);
            }
        };
        let now = (self.clock)();

        tracing::info!(
            "{}/{} | {} | Processing from {}",
            index,
            total,
            symbol,
            start.format("%Y-%m-%d %H:%M:%S")
        );

        let ctx = self.context();
        let result = match kind {
            StreamKind::Candles => {
                drive_candles(ctx, symbol, start, now, self.ingest.candle_step()).await
            }
            StreamKind::Trades => drive_trades(ctx, symbol, start, now, &self.ingest).await,
            StreamKind::FundingTrades => {
                drive_fundings(ctx, symbol, start, now, &self.ingest).await
            }
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    symbol,
                    stream = %kind,
                    cursor = %report.cursor,
                    exit = ?report.exit,
                    pages = report.stats.pages,
                    inserted = report.stats.inserted,
                    "Symbol pass complete"
                );
                SymbolOutcome::Completed(report)
            }
            Err(err) => {
                tracing::warn!(symbol, stream = %kind, error = %err, "Symbol pass failed, retrying next cycle");
                SymbolOutcome::Failed(err)
            }
        }
    }

    /// Repeats cycles until the stop flag is raised.
    ///
    /// Returns the number of completed cycles.
    pub async fn run_forever(&self) -> u64 {
        let pause = Duration::from_secs(self.ingest.cycle_pause_secs);
        let mut cycles = 0u64;

        while !self.stopping() {
            let report = self.run_cycle().await;
            if self.stopping() {
                tracing::info!("Stop requested, {}", report.summary());
                break;
            }
            cycles += 1;
            tracing::info!("Went through all symbols. Start over again! {}", report.summary());

            // A cycle without requests would otherwise spin.
            let idle = if report.stats.requests == 0 {
                pause.max(self.fetcher.policy().request_interval)
            } else {
                pause
            };
            self.pause(idle).await;
        }

        cycles
    }

    async fn pause(&self, duration: Duration) {
        const SLICE: Duration = Duration::from_millis(250);
        let mut remaining = duration;
        while !remaining.is_zero() && !self.stopping() {
            let slice = remaining.min(SLICE);
            tokio::time::sleep(slice).await;
            remaining -= slice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        fast_policy, funding, minute_candles, spaced_trades, t0, ScriptedSource,
    };
    use chrono::Duration as ChronoDuration;
    use harvest_data::{MemoryStore, TradeRecord};
    use parking_lot::Mutex;

    fn universe() -> SymbolUniverse {
        SymbolUniverse {
            candles: vec!["btcusd".to_string(), "ethusd".to_string()],
            trading: vec!["btcusd".to_string()],
            funding: vec!["usd".to_string()],
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ingest.epoch = t0();
        config.ingest.trade_empty_step_secs = 60;
        config
    }

    fn fixed_clock(at: DateTime<Utc>) -> Clock {
        Arc::new(move || at)
    }

    fn harvester(
        source: &Arc<ScriptedSource>,
        store: &Arc<MemoryStore>,
        config: &AppConfig,
        now: DateTime<Utc>,
    ) -> Harvester {
        source.publish_until(now);
        let fetcher = PageFetcher::new(source.clone(), fast_policy()).unwrap();
        Harvester::new(fetcher, store.clone(), universe(), config).with_clock(fixed_clock(now))
    }

    fn seeded_source() -> Arc<ScriptedSource> {
        let source = Arc::new(ScriptedSource::new());
        source.add_candles(minute_candles("btcusd", t0(), 1500));
        source.add_candles(minute_candles("ethusd", t0(), 700));
        source.add_trades(spaced_trades("btcusd", 1, t0(), ChronoDuration::seconds(7), 300));
        source.add_fundings(
            (0..40)
                .map(|i| funding("usd", i, t0() + ChronoDuration::minutes(3 * i)))
                .collect(),
        );
        source
    }

    #[tokio::test]
    async fn test_cycle_visits_streams_in_order() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let now = t0() + ChronoDuration::minutes(30);

        let report = harvester(&source, &store, &config(), now).run_cycle().await;

        assert_eq!(report.completed, 4);
        assert_eq!(report.failed, 0);
        let kinds: Vec<StreamKind> = source.requests().into_iter().map(|(k, _)| k).collect();
        let first_funding = kinds.iter().position(|k| *k == StreamKind::FundingTrades).unwrap();
        let first_trade = kinds.iter().position(|k| *k == StreamKind::Trades).unwrap();
        assert!(kinds[..first_funding].iter().all(|k| *k == StreamKind::Candles));
        assert!(kinds[first_trade..].iter().all(|k| *k == StreamKind::Trades));
        assert!(first_funding < first_trade);
    }

    #[tokio::test]
    async fn test_disabled_streams_are_not_requested() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let mut config = config();
        config.streams.candles = false;
        config.streams.fundings = false;

        let report = harvester(&source, &store, &config, t0() + ChronoDuration::minutes(5))
            .run_cycle()
            .await;

        assert_eq!(report.completed, 1);
        assert!(source.requests().iter().all(|(k, _)| *k == StreamKind::Trades));
    }

    #[tokio::test]
    async fn test_failing_symbol_does_not_stop_the_cycle() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_for("btcusd");
        let now = t0() + ChronoDuration::minutes(30);

        let report = harvester(&source, &store, &config(), now).run_cycle().await;

        // btcusd candles and btcusd trades fail; ethusd candles and usd fundings succeed.
        assert_eq!(report.failed, 2);
        assert_eq!(report.completed, 2);
        assert_eq!(store.candles("ethusd").len(), 30);
        assert!(store.candles("btcusd").is_empty());
        assert!(!store.funding_trades("usd").is_empty());
    }

    #[tokio::test]
    async fn test_failed_symbol_is_retried_next_cycle() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_for("btcusd");
        let now = t0() + ChronoDuration::minutes(30);
        let harvester = harvester(&source, &store, &config(), now);

        harvester.run_cycle().await;
        store.heal("btcusd");
        let second = harvester.run_cycle().await;

        assert_eq!(second.failed, 0);
        assert_eq!(store.candles("btcusd").len(), 30);
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_skips_symbol_for_the_cycle() {
        let source = seeded_source();
        source.throttle_next(6);
        let store = Arc::new(MemoryStore::new());
        let now = t0() + ChronoDuration::minutes(30);

        let report = harvester(&source, &store, &config(), now).run_cycle().await;

        assert_eq!(report.failed, 1);
        assert!(store.candles("btcusd").is_empty());
        assert_eq!(store.candles("ethusd").len(), 30);
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic_across_runs() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let config = config();
        let mut previous: Option<Vec<Option<DateTime<Utc>>>> = None;

        for minutes in [10, 40, 90, 200] {
            let now = t0() + ChronoDuration::minutes(minutes);
            harvester(&source, &store, &config, now).run_cycle().await;
            let mut latest = Vec::new();
            for (kind, symbol) in [
                (StreamKind::Candles, "btcusd"),
                (StreamKind::FundingTrades, "usd"),
                (StreamKind::Trades, "btcusd"),
            ] {
                latest.push(store.latest_time(kind, symbol).await.unwrap());
            }
            if let Some(previous) = &previous {
                for (before, after) in previous.iter().zip(&latest) {
                    assert!(after >= before);
                }
            }
            previous = Some(latest);
        }
        assert!(previous.unwrap().iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn test_resumed_run_equals_uninterrupted_run() {
        let source = seeded_source();
        let config = config();
        let end = t0() + ChronoDuration::minutes(120);

        let straight = Arc::new(MemoryStore::new());
        harvester(&source, &straight, &config, end).run_cycle().await;

        let resumed = Arc::new(MemoryStore::new());
        harvester(&source, &resumed, &config, t0() + ChronoDuration::minutes(17))
            .run_cycle()
            .await;
        harvester(&source, &resumed, &config, t0() + ChronoDuration::minutes(55))
            .run_cycle()
            .await;
        harvester(&source, &resumed, &config, end).run_cycle().await;

        let ids = |store: &MemoryStore| -> Vec<i64> {
            store.trades("btcusd").iter().map(|t: &TradeRecord| t.id).collect()
        };
        assert_eq!(ids(resumed.as_ref()), ids(straight.as_ref()));
        assert_eq!(resumed.candles("btcusd"), straight.candles("btcusd"));
        assert_eq!(resumed.candles("ethusd"), straight.candles("ethusd"));
        assert_eq!(resumed.funding_trades("usd"), straight.funding_trades("usd"));
        assert!(!straight.funding_trades("usd").is_empty());
        for kind in StreamKind::ALL {
            assert_eq!(resumed.row_count(kind), straight.row_count(kind));
        }
    }

    #[tokio::test]
    async fn test_second_cycle_rewrites_nothing() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let now = t0() + ChronoDuration::minutes(60);
        let harvester = harvester(&source, &store, &config(), now);

        let first = harvester.run_cycle().await;
        let second = harvester.run_cycle().await;

        assert!(first.stats.inserted > 0);
        assert_eq!(second.stats.inserted, 0);
    }

    #[tokio::test]
    async fn test_stop_flag_lets_in_flight_symbol_finish() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let now = t0() + ChronoDuration::minutes(30);
        let harvester = harvester(&source, &store, &config(), now);
        source.stop_after(1, harvester.stop_flag());

        let report = harvester.run_cycle().await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.candles("btcusd").len(), 30);
        assert!(source.requests().iter().all(|(k, r)| *k == StreamKind::Candles
            && r.symbol == "btcusd"));
    }

    #[tokio::test]
    async fn test_run_forever_returns_after_stop() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let mut config = config();
        config.streams.candles = false;
        config.streams.fundings = false;
        let cycles_seen = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&cycles_seen);
        let now = t0() + ChronoDuration::minutes(5);
        let harvester = harvester(&source, &store, &config, now);
        let stop = harvester.stop_flag();

        // Each cycle of one caught-up trade symbol makes a handful of requests.
        let clock: Clock = Arc::new(move || {
            let mut seen = seen.lock();
            *seen += 1;
            if *seen >= 3 {
                stop.store(true, Ordering::SeqCst);
            }
            now
        });
        let harvester = harvester.with_clock(clock);

        let cycles = harvester.run_forever().await;

        assert_eq!(*cycles_seen.lock(), 3);
        assert_eq!(cycles, 2);
    }

    #[tokio::test]
    async fn test_workers_process_every_symbol() {
        let source = seeded_source();
        let store = Arc::new(MemoryStore::new());
        let mut config = config();
        config.ingest.workers = 4;
        let now = t0() + ChronoDuration::minutes(30);

        let report = harvester(&source, &store, &config, now).run_cycle().await;

        assert_eq!(report.completed, 4);
        assert_eq!(store.candles("btcusd").len(), 30);
        assert_eq!(store.candles("ethusd").len(), 30);
    }
}
