//! Candle repository.
//!
//! Set-based idempotent inserts and cursor queries for the `candles` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{SymbolCoverage, INSERT_CHUNK_SIZE};
use crate::models::CandleRecord;

/// Repository for candle operations.
#[derive(Debug, Clone)]
pub struct CandleRepository {
    pool: PgPool,
}

impl CandleRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of candles in one transaction.
    ///
    /// Rows whose (symbol, time) already exists are skipped.
    ///
    /// # Returns
    /// The number of rows actually inserted (excluding duplicates).
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is committed then.
    pub async fn insert_batch(&self, records: &[CandleRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut inserted = 0u64;

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = insert_query(chunk);
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert candles")?;
            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Returns the open time of the most recent stored candle for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn latest_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(time) FROM candles WHERE symbol = $1")
                .bind(symbol)
                .fetch_one(&self.pool)
                .await
                .context("Failed to query latest candle time")?;

        Ok(latest)
    }

    /// Returns row count and time bounds for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn coverage(&self, symbol: &str) -> Result<SymbolCoverage> {
        let (rows, first, last): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                "SELECT COUNT(*), MIN(time), MAX(time) FROM candles WHERE symbol = $1",
            )
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .context("Failed to query candle coverage")?;

        Ok(SymbolCoverage { rows, first, last })
    }
}

fn insert_query(chunk: &[CandleRecord]) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::new("INSERT INTO candles (symbol, time, open, close, high, low, volume) ");
    builder.push_values(chunk, |mut row, candle| {
        row.push_bind(candle.symbol.clone())
            .push_bind(candle.time)
            .push_bind(candle.open)
            .push_bind(candle.close)
            .push_bind(candle.high)
            .push_bind(candle.low)
            .push_bind(candle.volume);
    });
    builder.push(" ON CONFLICT (symbol, time) DO NOTHING");
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(minute: i64) -> CandleRecord {
        CandleRecord {
            symbol: "btcusd".to_string(),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(minute),
            open: dec!(100),
            close: dec!(101),
            high: dec!(102),
            low: dec!(99),
            volume: dec!(3.5),
        }
    }

    #[test]
    fn test_insert_query_is_single_multi_row_statement() {
        let records: Vec<CandleRecord> = (0..3).map(candle).collect();
        let sql = insert_query(&records).into_sql();

        assert!(sql.starts_with("INSERT INTO candles (symbol, time, open, close, high, low, volume) VALUES"));
        assert!(sql.ends_with("ON CONFLICT (symbol, time) DO NOTHING"));
        assert!(sql.contains("$21"));
        assert!(!sql.contains("$22"));
    }

    #[test]
    fn test_chunking_stays_under_bind_limit() {
        // 7 binds per candle, PostgreSQL allows 65535 per statement
        assert!(INSERT_CHUNK_SIZE * 7 < 65_535);
    }

    #[tokio::test]
    async fn test_failures_carry_context() {
        let repo = CandleRepository::new(crate::repositories::unreachable_pool());

        let err = repo.insert_batch(&[candle(0)]).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to begin transaction");

        let err = repo.latest_time("btcusd").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to query latest candle time");
    }
}
