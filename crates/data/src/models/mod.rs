//! Record models for the three harvested streams.

pub mod candle;
pub mod funding_trade;
pub mod trade;

pub use candle::CandleRecord;
pub use funding_trade::FundingTradeRecord;
pub use trade::TradeRecord;

use chrono::{DateTime, Utc};

/// Records that carry the instant the pagination cursor follows.
pub trait Timestamped {
    fn time(&self) -> DateTime<Utc>;
}
