//! One-minute candle model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamped;

/// An OHLCV candle. Natural key: (symbol, time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CandleRecord {
    /// Symbol as listed in the candle universe (e.g., "btcusd")
    pub symbol: String,
    /// Minute-aligned open time
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
}

impl Timestamped for CandleRecord {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}
