//! Public trade model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamped;

/// A public trade. Natural key: `id` (unique across the source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub symbol: String,
    /// Source-assigned trade ID
    pub id: i64,
    /// Execution time, millisecond precision
    pub time: DateTime<Utc>,
    /// Signed amount in base currency; negative for sells
    pub amount: Decimal,
    pub price: Decimal,
}

impl Timestamped for TradeRecord {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}
