use crate::config::AppConfig;
use crate::error::{HarvestError, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Harvest.toml";

/// Prefix of environment variables overriding file settings, e.g.
/// `HARVEST_DATABASE__HOST=db.internal`.
pub const ENV_PREFIX: &str = "HARVEST_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, the default TOML file and
    /// `HARVEST_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a file cannot be parsed or a value has
    /// the wrong type.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be parsed or a value has
    /// the wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        Self::figment(path.as_ref())
            .extract()
            .map_err(|e| HarvestError::configuration(e.to_string()))
    }

    fn figment(path: &Path) -> Figment {
        let json_path = path.with_extension("json");
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .join(Json::file(json_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
