// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Mikael Lund

//! Conversion options, plus user-level defaults persisted between runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Options governing a single conversion, passed into
/// [`crate::converter::Converter`].
#[derive(Debug, Clone, Default)]
pub struct ConverterConfig {
    /// Force the minimal (screen-disabled) driver even when a screen would fit.
    pub blank_screen: bool,
    /// Apply a [`crate::compressor::Compressor`] to the finished program.
    pub compress: bool,
    /// Overrides the tune's start subtune (`1..=255`); `None` uses the header default.
    pub initial_song: Option<u16>,
    /// Include the STIL directory-level global comment in the scroll text.
    pub use_global_comment: bool,
    /// Local HVSC collection root, used to derive the STIL lookup key from
    /// the input file's path.
    pub hvsc_root: Option<PathBuf>,
    /// Song-length database path; informational only, the core does not
    /// query it.
    pub song_length_db: Option<PathBuf>,
    /// Emit a memory-map diagnostic via `log::info!`.
    pub verbose: bool,
}

/// User-level default flags, persisted between CLI invocations the way the
/// original config module persisted its color scheme.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserDefaults {
    /// Default HVSC collection root, if one is usually used.
    #[serde(default)]
    pub hvsc_root: Option<PathBuf>,
    /// Default song-length database path.
    #[serde(default)]
    pub song_length_db: Option<PathBuf>,
    /// Whether `--compress` is on by default.
    #[serde(default)]
    pub compress: bool,
}

impl Default for UserDefaults {
    fn default() -> Self {
        Self {
            hvsc_root: None,
            song_length_db: None,
            compress: false,
        }
    }
}

impl UserDefaults {
    /// Loads defaults from file, falling back to built-in defaults if not
    /// found or invalid.
    pub fn load() -> Self {
        config_path()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Saves defaults to file (best-effort, errors ignored).
    pub fn save(&self) {
        let Some(path) = config_path() else { return };
        let Some(parent) = path.parent() else { return };
        let _ = fs::create_dir_all(parent);
        if let Ok(content) = toml::to_string_pretty(self) {
            let _ = fs::write(&path, content);
        }
    }
}

/// Returns the config file path (~/.config/psid64/config.toml).
fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("psid64").join("config.toml"))
}

impl ConverterConfig {
    /// Builds a [`ConverterConfig`] seeded from persisted [`UserDefaults`].
    pub fn from_defaults(defaults: &UserDefaults) -> Self {
        Self {
            hvsc_root: defaults.hvsc_root.clone(),
            song_length_db: defaults.song_length_db.clone(),
            compress: defaults.compress,
            ..Self::default()
        }
    }

    /// The HVSC-relative path for `input_path`, derived by stripping
    /// `hvsc_root` as a prefix, the way the STIL lookup key is derived from
    /// the tune's full file name.
    pub fn hvsc_relative_path(&self, input_path: &Path) -> Option<String> {
        let root = self.hvsc_root.as_ref()?;
        let relative = input_path.strip_prefix(root).ok()?;
        Some(format!("/{}", relative.display()).replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hvsc_relative_path_strips_the_root() {
        let config = ConverterConfig {
            hvsc_root: Some(PathBuf::from("/collections/hvsc")),
            ..Default::default()
        };
        let path = Path::new("/collections/hvsc/MUSICIANS/H/Hubbard_Rob/Commando.sid");
        assert_eq!(
            config.hvsc_relative_path(path).as_deref(),
            Some("/MUSICIANS/H/Hubbard_Rob/Commando.sid")
        );
    }

    #[test]
    fn no_hvsc_root_yields_no_relative_path() {
        let config = ConverterConfig::default();
        assert_eq!(config.hvsc_relative_path(Path::new("/tmp/x.sid")), None);
    }
}
