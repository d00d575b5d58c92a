//! Configuration files.
//!
//! # Format
//!
//! ```toml
//! [i3hub]
//! extensions = ["nop_binding", "keyboard_layout"]
//!
//! [keyboard_layout]
//! layouts = ["us", "de"]
//! extra-xkb-opts = "-option ctrl:nocaps"
//! ```
//!
//! The `[i3hub]` table selects extensions; every other table is the option
//! set of the extension with the same name, handed to it on init.
//!
//! Files found in the extra configuration directories (`*.toml`, lexical
//! order) are applied on top of the main file. They may replace the list
//! (`extensions`), extend it (`extensions_append`) or shrink it
//! (`extensions_remove`); their extension tables are merged key by key.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Directory name under the XDG base directories.
pub const APP_DIR: &str = "i3hub";

/// Main configuration file name.
pub const CONFIG_FILE: &str = "i3hub.toml";

/// Drop-in directory name next to the main file.
pub const EXTRA_CONFIG_DIR: &str = "config.d";

/// Table holding the hub's own settings.
pub const HUB_TABLE: &str = "i3hub";

// ============================================================================
// Paths
// ============================================================================

/// Returns `$XDG_CONFIG_HOME/i3hub/i3hub.toml`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Returns `$XDG_CONFIG_HOME/i3hub/config.d`.
#[must_use]
pub fn default_extra_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_DIR)
        .join(EXTRA_CONFIG_DIR)
}

/// Returns `$XDG_RUNTIME_DIR/i3hub`, or a directory under the system
/// temp dir when no runtime dir is set.
#[must_use]
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

// ============================================================================
// Config
// ============================================================================

/// Settings of the `[i3hub]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HubTable {
    extensions: Option<Vec<String>>,
    extensions_append: Vec<String>,
    extensions_remove: Vec<String>,
}

/// Loaded configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Extension names in load order.
    pub extensions: Vec<String>,
    /// Option tables keyed by extension name.
    pub sections: FxHashMap<String, Value>,
}

impl Config {
    /// Loads the main file and every extra directory.
    ///
    /// A missing main file or directory is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a file cannot be read or parsed.
    pub fn load(path: &Path, extra_dirs: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();

        if path.is_file() {
            config.apply_file(path)?;
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
        }

        for dir in extra_dirs {
            for file in toml_files(dir)? {
                config.apply_file(&file)?;
            }
        }

        debug!(extensions = ?config.extensions, "Configuration loaded");
        Ok(config)
    }

    /// Parses a single configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on invalid TOML or an invalid `[i3hub]`
    /// table.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply(text, "<string>")?;
        Ok(config)
    }

    /// Returns the option table of extension `name`.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Applying configuration file");
        self.apply(&text, &path.display().to_string())
    }

    fn apply(&mut self, text: &str, origin: &str) -> Result<()> {
        let mut table: toml::Table =
            toml::from_str(text).map_err(|e| Error::config(format!("{origin}: {e}")))?;

        if let Some(hub) = table.remove(HUB_TABLE) {
            let hub: HubTable = hub
                .try_into()
                .map_err(|e| Error::config(format!("{origin}: [{HUB_TABLE}]: {e}")))?;
            self.apply_extension_list(hub);
        }

        for (name, value) in table {
            let value = serde_json::to_value(value)?;
            match (self.sections.get_mut(&name), value) {
                (Some(Value::Object(existing)), Value::Object(update)) => existing.extend(update),
                (_, value) => {
                    self.sections.insert(name, value);
                }
            }
        }

        Ok(())
    }

    fn apply_extension_list(&mut self, hub: HubTable) {
        if let Some(extensions) = hub.extensions {
            self.extensions = extensions;
        }
        for name in hub.extensions_append {
            if !self.extensions.contains(&name) {
                self.extensions.push(name);
            }
        }
        self.extensions
            .retain(|name| !hub.extensions_remove.contains(name));
    }
}

/// Lists the `*.toml` files of `dir` in lexical order.
fn toml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Skipping missing configuration directory");
        return Ok(Vec::new());
    }

    let entries =
        fs::read_dir(dir).map_err(|e| Error::config(format!("{}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
