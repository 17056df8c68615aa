//! The `init-db` command: create tables and indexes, then exit.

use anyhow::Result;
use harvest_core::AppConfig;

use super::{connect_store, DbArgs};

/// Creates the schema in the configured database.
///
/// # Errors
/// Returns an error for invalid connection settings or a failed connection.
pub async fn run_init_db(db: DbArgs, mut config: AppConfig) -> Result<()> {
    db.apply(&mut config);
    config.validate_database()?;

    connect_store(&config).await?;
    println!("Schema ready");

    Ok(())
}
