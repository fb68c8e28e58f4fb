//! Persisted state owned by the host process.
//!
//! - [`Settings`]: sandbox root and exclusion sets (`settings.json`)
//! - [`RecentFiles`]: bounded most-recent-first file list (`recent.json`)
//! - [`QuireConfig`]: server/model/API key configuration (`config.toml`)
//!
//! All three live under [`quire_home`], `~/.quire` unless `QUIRE_HOME` is set.

mod app;
mod recent;
mod settings;

pub use app::{ApiKeys, AppSection, ConfigError, QuireConfig, ServerSection, expand_env_vars};
pub use recent::{MAX_RECENT_FILES, RecentFiles};
pub use settings::{Settings, SettingsError, SettingsStore, SettingsUpdate};

use std::path::PathBuf;

/// Directory holding every Quire-owned file.
#[must_use]
pub fn quire_home() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("QUIRE_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(".quire"))
}
