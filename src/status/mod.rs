//! Status line side of the hub.
//!
//! When launched as the bar's status command the hub writes status arrays
//! to stdout and reads click events from stdin.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `item` | [`StatusItem`] and merge-by-name [`StatusArray`] |
//! | `stream` | Header, array lines and click event input |

// ============================================================================
// Submodules
// ============================================================================

/// Status items and the merge-by-name array.
pub mod item;

/// Status line streaming protocol.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use item::{Markup, StatusArray, StatusItem};
pub use stream::{StatusHeader, StatusWriter, click_events};
