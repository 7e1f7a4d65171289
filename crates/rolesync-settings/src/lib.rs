//! # rolesync-settings
//!
//! Process configuration, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RoleSyncSettings::default()`]
//! 2. **User file**: `~/.rolesync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROLESYNC_*` overrides (highest priority)
//!
//! Per-guild role rules are not part of this; they live in the guild
//! settings store.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
