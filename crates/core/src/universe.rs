//! Static symbol universes.
//!
//! Each universe is a JSON array of symbol strings, loaded once at start-up.
//! The three lists may overlap but are tracked independently.

use std::fs;
use std::path::Path;

use crate::config::UniverseConfig;
use crate::error::{HarvestError, Result};
use crate::stream::StreamKind;

/// The symbols harvested for each stream kind, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolUniverse {
    pub candles: Vec<String>,
    pub trading: Vec<String>,
    pub funding: Vec<String>,
}

impl SymbolUniverse {
    /// Loads the three symbol files named in the configuration.
    ///
    /// Only the universes of enabled streams need to exist; a disabled stream
    /// with a missing file gets an empty list.
    ///
    /// # Errors
    /// Returns a configuration error if an enabled stream's file is missing or
    /// is not a JSON array of strings.
    pub fn load(config: &UniverseConfig, enabled: &[StreamKind]) -> Result<Self> {
        let load_if = |kind: StreamKind, path: &Path| -> Result<Vec<String>> {
            if enabled.contains(&kind) {
                load_symbols(path)
            } else {
                Ok(Vec::new())
            }
        };

        let universe = Self {
            candles: load_if(StreamKind::Candles, &config.candles_file)?,
            trading: load_if(StreamKind::Trades, &config.trading_file)?,
            funding: load_if(StreamKind::FundingTrades, &config.funding_file)?,
        };

        tracing::info!("Found {} candle symbols", universe.candles.len());
        tracing::info!("Found {} funding symbols", universe.funding.len());
        tracing::info!("Found {} trading symbols", universe.trading.len());

        Ok(universe)
    }

    /// Returns the universe harvested for a stream kind.
    #[must_use]
    pub fn for_stream(&self, kind: StreamKind) -> &[String] {
        match kind {
            StreamKind::Candles => &self.candles,
            StreamKind::Trades => &self.trading,
            StreamKind::FundingTrades => &self.funding,
        }
    }
}

/// Reads one symbol file, dropping blanks and duplicates while keeping order.
///
/// # Errors
/// Returns a configuration error if the file cannot be read or parsed.
pub fn load_symbols(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).map_err(|e| {
        HarvestError::configuration(format!("cannot read symbol file {}: {e}", path.display()))
    })?;
    let symbols: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
        HarvestError::configuration(format!(
            "symbol file {} must be a JSON array of strings: {e}",
            path.display()
        ))
    })?;

    let mut unique = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim().to_string();
        if !symbol.is_empty() && !unique.contains(&symbol) {
            unique.push(symbol);
        }
    }
    Ok(unique)
}
