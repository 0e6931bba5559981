//! # lookout-settings
//!
//! Configuration management with layered sources for the Lookout client.
//!
//! Settings are loaded from three layers, lowest priority first:
//! 1. **Compiled defaults**: [`LookoutSettings::default()`]
//! 2. **User file**: `~/.lookout/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LOOKOUT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, settings_path, validate,
};
pub use types::*;
