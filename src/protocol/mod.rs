//! Control socket protocol types.
//!
//! This module defines the wire format spoken with the window manager and
//! the event names handlers subscribe to.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | request | Hub → WM | One of the [`MessageType`] catalog |
//! | reply | WM → Hub | Answer to the single outstanding request |
//! | event | WM → Hub | One of the [`WmEvent`] catalog (bit 31 set) |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Binary envelope codec |
//! | `message` | Request message catalog |
//! | `event` | Event catalogs and namespaced names |

// ============================================================================
// Submodules
// ============================================================================

/// Event catalogs and namespaced event names.
pub mod event;

/// Binary frame codec.
pub mod frame;

/// Request message catalog.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{EventName, HubEvent, IncomingEvent, WmEvent};
pub use frame::{FrameHeader, HEADER_LEN, MAGIC};
pub use message::MessageType;
