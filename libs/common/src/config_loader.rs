//! Configuration loading helper functions
//!
//! Layered loading on top of figment: serialized defaults, an optional YAML
//! file, prefixed environment variables, and flat variable names.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use errors::{ServiceError, ServiceResult};

/// Sources for one layered configuration load
pub struct ConfigSources<'a> {
    /// YAML file, skipped when it does not exist
    pub yaml_path: Option<&'a Path>,
    /// Prefix for structured variables, nested with `__` (e.g. `DISPATCHSRV_HTTP__TIMEOUT_SECS`)
    pub env_prefix: &'a str,
    /// Flat variable name to dotted key path (e.g. `WEB_API_KEY` -> `credentials.signing_key`)
    pub env_aliases: &'a [(&'a str, &'a str)],
}

/// Load configuration with priority: aliases > prefixed env > YAML > defaults
pub fn load_layered<T>(defaults: &T, sources: &ConfigSources<'_>) -> ServiceResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut figment = Figment::from(Serialized::defaults(defaults));

    if let Some(path) = sources.yaml_path {
        if path.exists() {
            info!("Loading configuration file: {}", path.display());
            figment = figment.merge(Yaml::file(path));
        } else {
            debug!("Configuration file not found, skipping: {}", path.display());
        }
    }

    figment = figment.merge(Env::prefixed(sources.env_prefix).split("__"));

    // Flat names are injected as strings so numeric-looking tokens keep leading zeros
    for (var, key) in sources.env_aliases {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                debug!("Using {} for {}", var, key);
                figment = figment.merge(Serialized::default(key, value));
            }
        }
    }

    figment
        .extract()
        .map_err(|e| ServiceError::Configuration(format!("Failed to load configuration: {}", e)))
}
