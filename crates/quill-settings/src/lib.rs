//! # quill-settings
//!
//! Layered configuration: compiled defaults, then `~/.quill/settings.json`
//! (deep-merged), then `QUILL_*` environment overrides. Settings are loaded
//! once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
