//! i3hub - Event hub and status line source for the i3 window manager.
//!
//! This library connects to the window manager's control socket and routes
//! its events, together with the hub's own lifecycle events, to a set of
//! compiled-in extensions. Launched as the bar's status command it also
//! streams the status line the extensions build.
//!
//! # Architecture
//!
//! ```text
//! socket bytes ─► frame codec ─► Connection ─┬─► reply slot ─► HubHandle calls
//!                                            └─► event queue ─► Hub loop ─► Registry ─► extensions
//!                                                                  │
//!                          bar stdin (clicks) ─────────────────────┤
//!                          bar stdout (status) ◄── StatusWriter ◄──┘
//! ```
//!
//! Key design principles:
//!
//! - One request on the wire at a time; callers queue in FIFO order
//! - One read loop per connection; replies and events never mix
//! - Handlers for one event run in registration order unless dispatched
//!   concurrently
//! - Shutdown handlers run exactly once
//!
//! # Quick Start
//!
//! ```no_run
//! use i3hub::Hub;
//! use i3hub::extensions::NopBinding;
//! use i3hub::transport::{Connection, resolve_socket_path};
//!
//! #[tokio::main]
//! async fn main() -> i3hub::Result<()> {
//!     let conn = Connection::connect(resolve_socket_path(None).await?).await?;
//!
//!     let hub = Hub::builder()
//!         .extension(NopBinding::shared())
//!         .build(conn)?;
//!
//!     hub.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration files and XDG paths |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`extensions`] | Built-in extensions and their catalog |
//! | [`hub`] | [`Hub`], [`HubHandle`], [`Extension`] contract |
//! | [`protocol`] | Frame codec, message and event catalogs |
//! | [`signals`] | Suspend/resume and termination signals |
//! | [`status`] | Status items and the bar streaming protocol |
//! | [`transport`] | Control socket connection |

// ============================================================================
// Modules
// ============================================================================

/// Configuration files and XDG paths.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Built-in extensions.
pub mod extensions;

/// Event hub: lifecycle, dispatch and the extension contract.
///
/// Use [`Hub::builder()`] to create a configured hub.
pub mod hub;

/// Control socket protocol types.
///
/// Frame codec plus the fixed message and event catalogs.
pub mod protocol;

/// Process signal handling.
pub mod signals;

/// Status line items and streaming protocol.
pub mod status;

/// Control socket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Config types
pub use config::Config;

// Error types
pub use error::{Error, Result};

// Hub types
pub use hub::{
    DispatchMode, Extension, Hub, HubBuilder, HubHandle, HubState, Registrar, Registry,
};

// Protocol types
pub use protocol::{EventName, HubEvent, MessageType, WmEvent};

// Signal types
pub use signals::SignalConfig;

// Status types
pub use status::{Markup, StatusArray, StatusItem};
