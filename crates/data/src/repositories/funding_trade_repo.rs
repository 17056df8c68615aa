//! Funding trade repository.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{SymbolCoverage, INSERT_CHUNK_SIZE};
use crate::models::FundingTradeRecord;

/// Repository for funding trade operations on the `fundings` table.
#[derive(Debug, Clone)]
pub struct FundingTradeRepository {
    pool: PgPool,
}

impl FundingTradeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of funding trades in one transaction.
    ///
    /// Conflicts on (symbol, time) are ignored, so a second funding trade on
    /// the same symbol and instant is dropped.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is committed then.
    pub async fn insert_batch(&self, records: &[FundingTradeRecord]) -> Result<u64> {
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
                .context("Failed to insert funding trades")?;
            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Gets the time of the most recent stored funding trade for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn latest_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(time) FROM fundings WHERE symbol = $1")
                .bind(symbol)
                .fetch_one(&self.pool)
                .await
                .context("Failed to query latest funding trade time")?;

        Ok(latest)
    }

    /// Returns row count and time bounds for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn coverage(&self, symbol: &str) -> Result<SymbolCoverage> {
        let (rows, first, last): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                "SELECT COUNT(*), MIN(time), MAX(time) FROM fundings WHERE symbol = $1",
            )
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .context("Failed to query funding trade coverage")?;

        Ok(SymbolCoverage { rows, first, last })
    }
}

fn insert_query(chunk: &[FundingTradeRecord]) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::new("INSERT INTO fundings (symbol, id, time, amount, rate, period) ");
    builder.push_values(chunk, |mut row, funding| {
        row.push_bind(funding.symbol.clone())
            .push_bind(funding.id)
            .push_bind(funding.time)
            .push_bind(funding.amount)
            .push_bind(funding.rate)
            .push_bind(funding.period);
    });
    builder.push(" ON CONFLICT (symbol, time) DO NOTHING");
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insert_query_targets_symbol_time_key() {
        let funding = FundingTradeRecord {
            symbol: "usd".to_string(),
            id: 7,
            time: Utc.timestamp_millis_opt(1_709_294_400_000).unwrap(),
            amount: dec!(250),
            rate: dec!(0.0001),
            period: 30,
        };
        let sql = insert_query(&[funding]).into_sql();

        assert!(sql.contains("(symbol, id, time, amount, rate, period) VALUES ($1, $2, $3, $4, $5, $6)"));
        assert!(sql.ends_with("ON CONFLICT (symbol, time) DO NOTHING"));
    }

    #[tokio::test]
    async fn test_failures_carry_context() {
        let repo = FundingTradeRepository::new(crate::repositories::unreachable_pool());
        let record = FundingTradeRecord {
            symbol: "usd".to_string(),
            id: 7,
            time: Utc.timestamp_millis_opt(1_709_294_400_000).unwrap(),
            amount: dec!(250),
            rate: dec!(0.0001),
            period: 30,
        };
        let err = repo.insert_batch(&[record]).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to begin transaction");

        let err = repo.latest_time("btcusd").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to query latest funding trade time");

        let err = repo.coverage("btcusd").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to query funding trade coverage");
    }
}
