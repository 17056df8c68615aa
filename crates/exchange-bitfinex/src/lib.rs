//! Bitfinex integration for the market-data harvester.
//!
//! Implements `MarketDataSource` over the public REST v2 history endpoints
//! for 1-minute candles, trading-pair trades and funding trades.

pub mod client;
mod rows;

pub use client::{BitfinexClient, BITFINEX_PUBLIC_URL};
