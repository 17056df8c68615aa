use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarvestError, Result};
use crate::stream::StreamKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub streams: StreamsConfig,
    pub universe: UniverseConfig,
    pub ingest: IngestConfig,
    /// Forces `debug` log level regardless of `RUST_LOG`.
    pub debug: bool,
}

/// Storage engines the harvester can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Accepted by the parser so the request can be rejected with a clear error.
    Mssql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Full connection URL. Takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            url: None,
            host: None,
            port: 5432,
            name: None,
            user: None,
            password: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Minimum delay between two consecutive requests, across all workers.
    pub request_interval_ms: u64,
    pub timeout_secs: u64,
    pub page_limit: usize,
    pub rate_limit_backoff_secs: u64,
    pub rate_limit_backoff_max_secs: u64,
    pub max_rate_limit_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-pub.bitfinex.com/v2".to_string(),
            request_interval_ms: 3_000,
            timeout_secs: 30,
            page_limit: 1_000,
            rate_limit_backoff_secs: 5,
            rate_limit_backoff_max_secs: 120,
            max_rate_limit_retries: 5,
        }
    }
}

impl SourceConfig {
    #[must_use]
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub candles: bool,
    pub trades: bool,
    pub fundings: bool,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            candles: true,
            trades: true,
            fundings: true,
        }
    }
}

impl StreamsConfig {
    #[must_use]
    pub fn is_enabled(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Candles => self.candles,
            StreamKind::Trades => self.trades,
            StreamKind::FundingTrades => self.fundings,
        }
    }

    /// Enabled streams in cycle order.
    #[must_use]
    pub fn enabled(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub candles_file: PathBuf,
    pub trading_file: PathBuf,
    pub funding_file: PathBuf,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            candles_file: PathBuf::from("symbols.json"),
            trading_file: PathBuf::from("symbols_trading.json"),
            funding_file: PathBuf::from("symbols_funding.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Start point for symbols with nothing stored yet.
    pub epoch: DateTime<Utc>,
    pub candle_step_minutes: i64,
    pub trade_empty_step_secs: i64,
    pub funding_empty_step_secs: i64,
    pub funding_min_progress_secs: i64,
    /// Resolution of the source's search timestamp.
    pub coarse_unit_ms: i64,
    pub workers: usize,
    pub cycle_pause_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            epoch: Utc
                .with_ymd_and_hms(2017, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            candle_step_minutes: 1_000,
            trade_empty_step_secs: 10,
            funding_empty_step_secs: 600,
            funding_min_progress_secs: 60,
            coarse_unit_ms: 1_000,
            workers: 1,
            cycle_pause_secs: 0,
        }
    }
}

impl IngestConfig {
    #[must_use]
    pub fn candle_step(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.candle_step_minutes)
    }

    #[must_use]
    pub fn trade_empty_step(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.trade_empty_step_secs)
    }

    #[must_use]
    pub fn funding_empty_step(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.funding_empty_step_secs)
    }

    #[must_use]
    pub fn funding_min_progress(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.funding_min_progress_secs)
    }

    #[must_use]
    pub fn coarse_unit(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.coarse_unit_ms)
    }
}

impl AppConfig {
    /// Checks the configuration before anything touches the network or storage.
    ///
    /// # Errors
    /// Returns `HarvestError::Configuration` for an unsupported backend,
    /// missing connection parameters, or non-positive steps and limits.
    pub fn validate(&self) -> Result<()> {
        self.validate_database()?;
        self.validate_ingest()
    }

    /// Checks storage settings only.
    ///
    /// # Errors
    /// Returns `HarvestError::Configuration` for an unsupported backend or
    /// missing connection parameters.
    pub fn validate_database(&self) -> Result<()> {
        if self.database.backend == StorageBackend::Mssql {
            return Err(HarvestError::configuration("MSSQL not supported"));
        }

        if self.database.url.is_none() {
            let missing: Vec<&str> = [
                ("host", &self.database.host),
                ("name", &self.database.name),
                ("user", &self.database.user),
            ]
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(field, _)| field)
            .collect();

            if !missing.is_empty() {
                return Err(HarvestError::configuration(format!(
                    "missing database {} (set database.url or the individual fields)",
                    missing.join(", ")
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(HarvestError::configuration(
                "database.max_connections must be > 0",
            ));
        }
        Ok(())
    }

    /// Checks source and ingestion settings.
    ///
    /// # Errors
    /// Returns `HarvestError::Configuration` for non-positive steps and limits.
    pub fn validate_ingest(&self) -> Result<()> {
        if self.source.page_limit == 0 {
            return Err(HarvestError::configuration("source.page_limit must be > 0"));
        }
        if self.source.request_interval_ms == 0 {
            return Err(HarvestError::configuration(
                "source.request_interval_ms must be > 0",
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(HarvestError::configuration("source.timeout_secs must be > 0"));
        }

        let steps = [
            ("ingest.candle_step_minutes", self.ingest.candle_step_minutes),
            ("ingest.trade_empty_step_secs", self.ingest.trade_empty_step_secs),
            (
                "ingest.funding_empty_step_secs",
                self.ingest.funding_empty_step_secs,
            ),
            ("ingest.coarse_unit_ms", self.ingest.coarse_unit_ms),
        ];
        if let Some((name, _)) = steps.iter().find(|(_, value)| *value <= 0) {
            return Err(HarvestError::configuration(format!("{name} must be > 0")));
        }
        if self.ingest.funding_min_progress_secs < 0 {
            return Err(HarvestError::configuration(
                "ingest.funding_min_progress_secs must be >= 0",
            ));
        }
        if self.ingest.workers == 0 {
            return Err(HarvestError::configuration("ingest.workers must be > 0"));
        }

        Ok(())
    }
}
