//! Built-in extensions.
//!
//! Extensions are compiled in and selected by name, from the
//! configuration file and the command line.
//!
//! | Name | Status only | Description |
//! |------|-------------|-------------|
//! | `nop_binding` | no | Emits an extension event for `nop <event>` bindings |
//! | `keyboard_layout` | yes | Cycles keyboard layouts, shows the active one |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::hub::Extension;

// ============================================================================
// Submodules
// ============================================================================

/// Keyboard layout switcher.
pub mod keyboard_layout;

/// `nop` binding events.
pub mod nop_binding;

// ============================================================================
// Re-exports
// ============================================================================

pub use keyboard_layout::KeyboardLayout;
pub use nop_binding::NopBinding;

// ============================================================================
// Catalog
// ============================================================================

/// Creates a fresh extension instance.
pub type Factory = fn() -> Arc<dyn Extension>;

/// Every built-in extension by name.
pub const CATALOG: &[(&str, Factory)] = &[
    (NopBinding::NAME, NopBinding::shared),
    (KeyboardLayout::NAME, KeyboardLayout::shared),
];

/// Instantiates the built-in extension named `name`.
#[must_use]
pub fn lookup(name: &str) -> Option<Arc<dyn Extension>> {
    CATALOG
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, factory)| factory())
}

/// Instantiates the extensions in `names`, in order.
///
/// Unknown names are skipped with a warning; a repeated name keeps its
/// first position.
#[must_use]
pub fn resolve<S: AsRef<str>>(names: &[S]) -> Vec<Arc<dyn Extension>> {
    let mut loaded: Vec<Arc<dyn Extension>> = Vec::with_capacity(names.len());

    for name in names {
        let name: &str = name.as_ref();
        if loaded.iter().any(|e| e.name() == name) {
            warn!(extension = name, "Extension listed twice, keeping the first");
            continue;
        }
        match lookup(name) {
            Some(extension) => {
                debug!(extension = name, "Extension found");
                loaded.push(extension);
            }
            None => warn!(extension = name, "Extension was not found"),
        }
    }

    loaded
}

// ============================================================================
// Tests
// ============================================================================
