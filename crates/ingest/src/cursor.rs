//! Resume points derived from storage.

use chrono::{DateTime, Utc};
use harvest_core::{Result, StreamKind};
use harvest_data::MarketStore;
use std::sync::Arc;

/// Turns stored data into the instant a symbol pass starts from.
#[derive(Clone)]
pub struct CursorResolver {
    store: Arc<dyn MarketStore>,
    epoch: DateTime<Utc>,
}

impl CursorResolver {
    #[must_use]
    pub fn new(store: Arc<dyn MarketStore>, epoch: DateTime<Utc>) -> Self {
        Self { store, epoch }
    }

    #[must_use]
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Latest stored instant for the symbol, or `None` if nothing is stored.
    ///
    /// # Errors
    /// Returns `HarvestError::Storage` if the query fails.
    pub async fn resolve(&self, kind: StreamKind, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        self.store.latest_time(kind, symbol).await
    }

    /// Start of the next pass: the latest stored instant, else the epoch.
    ///
    /// # Errors
    /// Returns `HarvestError::Storage` if the query fails.
    pub async fn start_for(&self, kind: StreamKind, symbol: &str) -> Result<DateTime<Utc>> {
        match self.resolve(kind, symbol).await? {
            Some(latest) => {
                tracing::debug!(symbol, stream = %kind, %latest, "Resuming from latest stored record");
                Ok(latest)
            }
            None => {
                tracing::debug!(symbol, stream = %kind, epoch = %self.epoch, "Nothing stored, starting from epoch");
                Ok(self.epoch)
            }
        }
    }
}
