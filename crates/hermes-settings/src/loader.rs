//! Settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`HermesSettings::default()`]
//! 2. Merge the JSON file if it exists
//! 3. Merge `HERMES_`-prefixed environment variables (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::HermesSettings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HERMES_";

/// Hermes data directory (`~/.hermes`).
pub fn hermes_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hermes")
}

/// Resolve the path to the settings file (`~/.hermes/settings.json`).
pub fn settings_path() -> PathBuf {
    hermes_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HermesSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file contributes nothing. Invalid JSON, mistyped values, and
/// settings that fail [`HermesSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<HermesSettings> {
    if path.exists() {
        debug!(?path, "loading settings from file");
    } else {
        debug!(?path, "settings file not found, using defaults");
    }
    let settings: HermesSettings = figment(path).extract()?;
    settings.validate()?;
    Ok(settings)
}

/// The layered provider chain, unextracted.
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(HermesSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
