//! Core types shared by every harvester crate.
//!
//! This crate provides:
//! - `StreamKind`, the three harvested data shapes
//! - `HarvestError`, the error taxonomy used at component seams
//! - `AppConfig` and its figment-backed `ConfigLoader`
//! - `SymbolUniverse`, the static symbol lists loaded at start-up

pub mod config;
pub mod config_loader;
pub mod error;
pub mod stream;
pub mod universe;

pub use config::{
    AppConfig, DatabaseConfig, IngestConfig, SourceConfig, StorageBackend, StreamsConfig,
    UniverseConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{HarvestError, Result};
pub use stream::StreamKind;
pub use universe::SymbolUniverse;
