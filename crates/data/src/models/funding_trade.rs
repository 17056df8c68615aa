//! Funding trade model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamped;

/// A matched funding (margin lending) trade.
///
/// Natural key is (symbol, time): source IDs are not known to be unique across
/// funding symbols, so two trades on the same symbol and instant collapse into
/// one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FundingTradeRecord {
    pub symbol: String,
    pub id: i64,
    pub time: DateTime<Utc>,
    /// Signed amount; positive for offers taken, negative for bids
    pub amount: Decimal,
    /// Daily rate
    pub rate: Decimal,
    /// Loan duration in days
    pub period: i32,
}

impl Timestamped for FundingTradeRecord {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}
