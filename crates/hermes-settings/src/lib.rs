//! # hermes-settings
//!
//! Configuration for the Hermes server, loaded in layers:
//!
//! 1. Compiled [`HermesSettings::default()`]
//! 2. Optional JSON file (`~/.hermes/settings.json` unless overridden)
//! 3. `HERMES_`-prefixed environment variables, `__` separating sections
//!    (`HERMES_SERVER__PORT=9000`)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, BusSettings, HermesSettings, LoggingSettings, ServerSettings, StoreSettings};
