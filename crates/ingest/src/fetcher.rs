//! Rate-limited page fetching.
//!
//! Every request from every worker passes through one shared governor
//! limiter. Throttled requests are reissued after an exponential backoff;
//! transport failures and timeouts degrade to an empty page.

use futures_util::future::BoxFuture;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use harvest_core::{HarvestError, Result, SourceConfig, StreamKind};
use harvest_data::{
    Batch, CandleRecord, FundingTradeRecord, MarketDataSource, PageRequest, Timestamped,
    TradeRecord,
};
use std::sync::Arc;
use std::time::Duration;

use crate::stats::HarvestStats;

/// Process-wide limiter shared by all fetchers.
pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// A record type that can be paged out of a `MarketDataSource` and stored.
pub trait PageRecord: Timestamped + Send + Sync + Sized + 'static {
    const KIND: StreamKind;

    fn fetch<'a>(
        source: &'a dyn MarketDataSource,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<Vec<Self>>>;

    fn batch(records: &[Self]) -> Batch<'_>;
}

impl PageRecord for CandleRecord {
    const KIND: StreamKind = StreamKind::Candles;

    fn fetch<'a>(
        source: &'a dyn MarketDataSource,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<Vec<Self>>> {
        source.candles(request)
    }

    fn batch(records: &[Self]) -> Batch<'_> {
        Batch::Candles(records)
    }
}

impl PageRecord for TradeRecord {
    const KIND: StreamKind = StreamKind::Trades;

    fn fetch<'a>(
        source: &'a dyn MarketDataSource,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<Vec<Self>>> {
        source.trades(request)
    }

    fn batch(records: &[Self]) -> Batch<'_> {
        Batch::Trades(records)
    }
}

impl PageRecord for FundingTradeRecord {
    const KIND: StreamKind = StreamKind::FundingTrades;

    fn fetch<'a>(
        source: &'a dyn MarketDataSource,
        request: &'a PageRequest,
    ) -> BoxFuture<'a, Result<Vec<Self>>> {
        source.funding_trades(request)
    }

    fn batch(records: &[Self]) -> Batch<'_> {
        Batch::FundingTrades(records)
    }
}

/// Pacing, timeout and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Minimum delay between two consecutive requests, across all workers.
    pub request_interval: Duration,
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Retries of one throttled request before the error is surfaced.
    pub max_rate_limit_retries: u32,
}

impl FetchPolicy {
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            request_interval: config.request_interval(),
            timeout: config.timeout(),
            backoff_base: Duration::from_secs(config.rate_limit_backoff_secs),
            backoff_max: Duration::from_secs(config.rate_limit_backoff_max_secs),
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins over the exponential schedule.
    #[must_use]
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay;
        }
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&SourceConfig::default())
    }
}

/// Builds the shared limiter: one request per `interval`, no burst.
///
/// # Errors
/// Returns `HarvestError::Configuration` for a zero interval.
pub fn rate_limiter(interval: Duration) -> Result<Arc<DirectRateLimiter>> {
    let quota = Quota::with_period(interval)
        .ok_or_else(|| HarvestError::configuration("request interval must be > 0"))?;
    Ok(Arc::new(RateLimiter::direct(quota)))
}

/// Fetches pages from a source under the shared limiter.
pub struct PageFetcher {
    source: Arc<dyn MarketDataSource>,
    limiter: Arc<DirectRateLimiter>,
    policy: FetchPolicy,
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PageFetcher {
    /// Creates a fetcher with its own limiter.
    ///
    /// # Errors
    /// Returns `HarvestError::Configuration` for a zero request interval.
    pub fn new(source: Arc<dyn MarketDataSource>, policy: FetchPolicy) -> Result<Self> {
        let limiter = rate_limiter(policy.request_interval)?;
        Ok(Self::with_limiter(source, policy, limiter))
    }

    /// Creates a fetcher that shares an existing limiter.
    #[must_use]
    pub fn with_limiter(
        source: Arc<dyn MarketDataSource>,
        policy: FetchPolicy,
        limiter: Arc<DirectRateLimiter>,
    ) -> Self {
        Self {
            source,
            limiter,
            policy,
        }
    }

    #[must_use]
    pub fn limiter(&self) -> Arc<DirectRateLimiter> {
        Arc::clone(&self.limiter)
    }

    #[must_use]
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetches one page.
    ///
    /// Returns an empty page on transport failure or timeout.
    ///
    /// # Errors
    /// Returns `HarvestError::RateLimit` once the retry budget is spent, or any
    /// non-transport error from the source.
    pub async fn fetch<R: PageRecord>(
        &self,
        request: &PageRequest,
        stats: &mut HarvestStats,
    ) -> Result<Vec<R>> {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;
            stats.requests += 1;

            let outcome =
                match tokio::time::timeout(self.policy.timeout, R::fetch(&*self.source, request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(HarvestError::transport(format!(
                        "request timed out after {:?}",
                        self.policy.timeout
                    ))),
                };

            match outcome {
                Ok(page) => {
                    stats.pages += 1;
                    stats.fetched += page.len() as u64;
                    return Ok(page);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= self.policy.max_rate_limit_retries {
                        tracing::warn!(
                            symbol = %request.symbol,
                            stream = %R::KIND,
                            attempts = attempt + 1,
                            "Rate limit retries exhausted"
                        );
                        return Err(err);
                    }
                    let delay = self.policy.backoff(attempt, err.retry_after());
                    attempt += 1;
                    stats.rate_limit_retries += 1;
                    tracing::warn!(
                        symbol = %request.symbol,
                        stream = %R::KIND,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(HarvestError::Transport(message)) => {
                    stats.pages += 1;
                    stats.transport_failures += 1;
                    tracing::warn!(
                        symbol = %request.symbol,
                        stream = %R::KIND,
                        start = %request.start,
                        error = %message,
                        "Transport failure, treating as empty page"
                    );
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            }
        }
    }
}
