use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HarvestError;

/// One of the three harvested data shapes, each with its own pagination rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// One-minute OHLCV candles, fetched in fixed windows.
    Candles,
    /// Public trades, fetched by following the last seen timestamp.
    Trades,
    /// Funding trades, fetched by following the last seen timestamp.
    FundingTrades,
}

impl StreamKind {
    /// Processing order of a full ingestion cycle.
    pub const ALL: [StreamKind; 3] = [
        StreamKind::Candles,
        StreamKind::FundingTrades,
        StreamKind::Trades,
    ];

    /// Returns the stream name as used in logs and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Candles => "candles",
            StreamKind::Trades => "trades",
            StreamKind::FundingTrades => "fundings",
        }
    }

    /// Returns the storage table holding this stream.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            StreamKind::Candles => "candles",
            StreamKind::Trades => "tradings",
            StreamKind::FundingTrades => "fundings",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "candles" | "candle" => Ok(StreamKind::Candles),
            "trades" | "trade" | "tradings" => Ok(StreamKind::Trades),
            "fundings" | "funding" | "funding_trades" | "funding-trades" => {
                Ok(StreamKind::FundingTrades)
            }
            other => Err(HarvestError::Configuration(format!(
                "unknown stream '{other}'. Valid values: candles, trades, fundings"
            ))),
        }
    }
}
