//! Bitfinex public REST v2 client.
//!
//! Issues exactly one HTTP request per call. Pacing and retries belong to the
//! caller; this client only classifies the outcome.
//!
//! # Example
//!
//! ```ignore
//! use harvest_bitfinex::BitfinexClient;
//! use harvest_data::{MarketDataSource, PageRequest};
//!
//! let client = BitfinexClient::new(BITFINEX_PUBLIC_URL, Duration::from_secs(30))?;
//! let page = client.trades(&PageRequest::starting_at("btcusd", start, 1000)).await?;
//! ```

use async_trait::async_trait;
use harvest_core::{HarvestError, Result, SourceConfig};
use harvest_data::{CandleRecord, FundingTradeRecord, MarketDataSource, PageRequest, TradeRecord};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::rows;

/// Bitfinex public API base URL.
pub const BITFINEX_PUBLIC_URL: &str = "https://api-pub.bitfinex.com/v2";

/// Error code Bitfinex puts in the body of a throttled response.
const RATE_LIMIT_CODE: i64 = 11010;

/// Candle timeframe requested for every symbol.
const CANDLE_TIMEFRAME: &str = "1m";

const MAX_ERROR_BODY: usize = 256;

/// Bitfinex REST client for the three harvested streams.
#[derive(Debug, Clone)]
pub struct BitfinexClient {
    http: Client,
    base_url: String,
}

impl BitfinexClient {
    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns `HarvestError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvestError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url.into()),
        })
    }

    /// Creates a client from the `[source]` configuration section.
    ///
    /// # Errors
    /// Returns `HarvestError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(url.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange symbol for a trading pair, e.g. `btcusd` -> `tBTCUSD`.
    #[must_use]
    pub fn trading_symbol(symbol: &str) -> String {
        format!("t{}", symbol.to_uppercase())
    }

    /// Exchange symbol for a funding currency, e.g. `usd` -> `fUSD`.
    #[must_use]
    pub fn funding_symbol(symbol: &str) -> String {
        format!("f{}", symbol.to_uppercase())
    }

    fn page_query(request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![("start", request.start.timestamp_millis().to_string())];
        if let Some(end) = request.end {
            query.push(("end", end.timestamp_millis().to_string()));
        }
        query.push(("limit", request.limit.to_string()));
        query.push(("sort", request.sort.as_param().to_string()));
        query
    }

    /// Makes a GET request and returns the top-level array of rows.
    async fn get_rows(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(HarvestError::rate_limit(retry_after));
        }

        let body = response.text().await.map_err(transport_error)?;
        let parsed = serde_json::from_str::<Value>(&body);

        if let Ok(value) = &parsed {
            if let Some(err) = error_payload(value) {
                return Err(err);
            }
        }
        if !status.is_success() {
            return Err(HarvestError::transport(format!(
                "API error {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }

        match parsed? {
            Value::Array(rows) => Ok(rows),
            other => Err(HarvestError::transport(format!(
                "unexpected response shape: {}",
                truncate(&other.to_string())
            ))),
        }
    }
}

fn normalize_base_url(mut url: String) -> String {
    let trimmed = url.trim_end_matches('/').len();
    url.truncate(trimmed);
    url
}

/// Classifies Bitfinex's `["error", CODE, MESSAGE]` body.
fn error_payload(value: &Value) -> Option<HarvestError> {
    let fields = value.as_array()?;
    if fields.first()?.as_str()? != "error" {
        return None;
    }
    let code = fields.get(1).and_then(Value::as_i64);
    if code == Some(RATE_LIMIT_CODE) {
        return Some(HarvestError::rate_limit(None));
    }
    let message = fields.get(2).and_then(Value::as_str).unwrap_or("unknown");
    Some(HarvestError::transport(format!(
        "API error {}: {message}",
        code.map_or_else(|| "?".to_string(), |c| c.to_string())
    )))
}

fn transport_error(err: reqwest::Error) -> HarvestError {
    if err.is_timeout() {
        HarvestError::transport(format!("request timed out: {err}"))
    } else {
        HarvestError::transport(err.to_string())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl MarketDataSource for BitfinexClient {
    async fn candles(&self, request: &PageRequest) -> Result<Vec<CandleRecord>> {
        let path = format!(
            "/candles/trade:{}:{}/hist",
            CANDLE_TIMEFRAME,
            Self::trading_symbol(&request.symbol)
        );
        let page = self.get_rows(&path, &Self::page_query(request)).await?;
        Ok(rows::decode_all(&request.symbol, page, rows::candle))
    }

    async fn trades(&self, request: &PageRequest) -> Result<Vec<TradeRecord>> {
        let path = format!("/trades/{}/hist", Self::trading_symbol(&request.symbol));
        let page = self.get_rows(&path, &Self::page_query(request)).await?;
        Ok(rows::decode_all(&request.symbol, page, rows::trade))
    }

    async fn funding_trades(&self, request: &PageRequest) -> Result<Vec<FundingTradeRecord>> {
        let path = format!("/trades/{}/hist", Self::funding_symbol(&request.symbol));
        let page = self.get_rows(&path, &Self::page_query(request)).await?;
        Ok(rows::decode_all(&request.symbol, page, rows::funding_trade))
    }
}
