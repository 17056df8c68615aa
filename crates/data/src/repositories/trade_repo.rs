//! Trade repository.
//!
//! The `tradings` table is keyed by the source trade ID alone; secondary
//! indexes on symbol and time serve cursor lookups and scans.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{SymbolCoverage, INSERT_CHUNK_SIZE};
use crate::models::TradeRecord;

/// Repository for public trade operations.
#[derive(Debug, Clone)]
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of trades in one transaction, skipping known IDs.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is committed then.
    pub async fn insert_batch(&self, records: &[TradeRecord]) -> Result<u64> {
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
                .context("Failed to insert trades")?;
            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Gets the time of the most recent stored trade for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn latest_time(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(time) FROM tradings WHERE symbol = $1")
                .bind(symbol)
                .fetch_one(&self.pool)
                .await
                .context("Failed to query latest trade time")?;

        Ok(latest)
    }

    /// Returns row count and time bounds for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn coverage(&self, symbol: &str) -> Result<SymbolCoverage> {
        let (rows, first, last): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                "SELECT COUNT(*), MIN(time), MAX(time) FROM tradings WHERE symbol = $1",
            )
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .context("Failed to query trade coverage")?;

        Ok(SymbolCoverage { rows, first, last })
    }
}

fn insert_query(chunk: &[TradeRecord]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO tradings (symbol, id, time, amount, price) ");
    builder.push_values(chunk, |mut row, trade| {
        row.push_bind(trade.symbol.clone())
            .push_bind(trade.id)
            .push_bind(trade.time)
            .push_bind(trade.amount)
            .push_bind(trade.price);
    });
    builder.push(" ON CONFLICT DO NOTHING");
    builder
}
