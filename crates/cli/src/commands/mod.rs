//! CLI commands for the harvester.

pub mod init_db;
pub mod run;
pub mod status;

pub use init_db::run_init_db;
pub use run::{run_harvest, RunArgs};
pub use status::{run_status, StatusArgs};

use anyhow::{Context, Result};
use clap::Args;
use harvest_core::{AppConfig, ConfigLoader, StorageBackend};
use harvest_data::{Database, PgMarketStore, Repositories};
use std::path::Path;

/// Database connection overrides shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct DbArgs {
    /// PostgreSQL host
    #[arg(long)]
    pub pghost: Option<String>,

    /// PostgreSQL database name
    #[arg(long)]
    pub pgdb: Option<String>,

    /// PostgreSQL user
    #[arg(long)]
    pub pguser: Option<String>,

    /// PostgreSQL password
    #[arg(long)]
    pub pgpw: Option<String>,

    /// Store into MSSQL instead of PostgreSQL (rejected: not supported)
    #[arg(long)]
    pub usemssql: bool,
}

impl DbArgs {
    fn any_connection_field(&self) -> bool {
        self.pghost.is_some() || self.pgdb.is_some() || self.pguser.is_some() || self.pgpw.is_some()
    }

    /// Applies the flags on top of the loaded configuration.
    ///
    /// Any connection flag drops a configured `database.url`, so the flags
    /// are what gets used.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.usemssql {
            config.database.backend = StorageBackend::Mssql;
        }
        if self.any_connection_field() {
            config.database.url = None;
        }
        if let Some(host) = &self.pghost {
            config.database.host = Some(host.clone());
        }
        if let Some(name) = &self.pgdb {
            config.database.name = Some(name.clone());
        }
        if let Some(user) = &self.pguser {
            config.database.user = Some(user.clone());
        }
        if let Some(password) = &self.pgpw {
            config.database.password = Some(password.clone());
        }
    }
}

/// Loads the layered configuration, from `path` when given.
///
/// # Errors
/// Returns an error if a configuration source cannot be parsed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };
    Ok(config)
}

/// Connects to PostgreSQL and makes sure the tables exist.
///
/// # Errors
/// Returns an error if the connection or schema creation fails.
pub async fn connect_store(config: &AppConfig) -> Result<PgMarketStore> {
    let database = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    database
        .ensure_schema()
        .await
        .context("Failed to create schema")?;
    tracing::info!("Connected to database");

    Ok(PgMarketStore::new(Repositories::new(database.pool().clone())))
}
