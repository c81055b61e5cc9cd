//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`FORMEL_` prefix, nested keys split on `__`)
//! 2. Config file, format chosen by extension
//! 3. Default values

use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix of all formel settings
pub const ENV_PREFIX: &str = "FORMEL_";

/// Load configuration from defaults, an optional file and the environment
pub fn load_config<T>(path: Option<&Path>) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    load_config_with_prefix(path, ENV_PREFIX)
}

/// [`load_config`] with a custom environment prefix
pub fn load_config_with_prefix<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        figment = merge_file(figment, path)?;
        debug!(path = %path.display(), "Loaded configuration file");
    }

    figment = figment.merge(Env::prefixed(env_prefix).split("__"));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}
