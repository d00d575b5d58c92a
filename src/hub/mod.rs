//! Event hub.
//!
//! This module ties the connection, the handler registry and the status
//! stream together.
//!
//! # Event Namespaces
//!
//! | Namespace | Source | Example |
//! |-----------|--------|---------|
//! | `i3::` | Window manager events | `i3::window` |
//! | `i3hub::` | Hub lifecycle | `i3hub::refresh` |
//! | `extension::` | Emitted by extensions | `extension::nop_binding::switch-layout` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`HubBuilder`] |
//! | `core` | [`Hub`] state machine and event loop |
//! | `extension` | [`Extension`] contract and [`Registrar`] |
//! | `handle` | [`HubHandle`] passed to extensions |
//! | `registry` | [`Registry`] and [`DispatchMode`] |

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for hub configuration.
pub mod builder;

/// Hub lifecycle and event loop.
pub mod core;

/// Extension callback contract.
pub mod extension;

/// Extension-facing hub API.
pub mod handle;

/// Event name to handler routing.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::HubBuilder;
pub use core::{Hub, HubState};
pub use extension::{Extension, Registrar};
pub use handle::HubHandle;
pub use registry::{DispatchMode, Registration, Registry};
