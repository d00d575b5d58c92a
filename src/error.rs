//! Error types for i3hub.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use i3hub::{HubHandle, Result};
//!
//! async fn example(hub: &HubHandle) -> Result<()> {
//!     hub.command("workspace 2").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Scope |
//! |----------|----------|-------|
//! | Configuration | [`Error::Config`] | startup |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] | whole connection |
//! | Protocol | [`Error::Protocol`] | whole connection (fatal) |
//! | Body | [`Error::BodyDecode`] | one exchange |
//! | Dispatch | [`Error::Handler`], [`Error::InvalidEvent`], [`Error::ExtensionNotLoaded`] | one handler |
//! | Lifecycle | [`Error::ShuttingDown`], [`Error::AlreadyClosed`], [`Error::AlreadyRunning`] | programming error |
//! | External | [`Error::Io`], [`Error::Json`] | varies |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a configuration file cannot be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connecting to the control socket failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The connection was closed, locally or by the peer.
    ///
    /// Every waiter blocked on a closed connection receives this error.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation.
    ///
    /// Bad magic, truncated frame or a reply nobody asked for. The
    /// connection is unusable afterwards.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A message body was not valid UTF-8 JSON.
    ///
    /// Local to one exchange; the connection stays usable.
    #[error("Malformed message body: {message}")]
    BodyDecode {
        /// Description of the decoding failure.
        message: String,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// An extension handler failed.
    #[error("Extension '{extension}' failed: {message}")]
    Handler {
        /// Name of the offending extension.
        extension: String,
        /// Description of the failure.
        message: String,
    },

    /// Event name outside the known namespaces or catalogs.
    #[error("Invalid event name: {name}")]
    InvalidEvent {
        /// The rejected event name.
        name: String,
    },

    /// A required extension is not loaded.
    #[error("Extension '{name}' is not loaded")]
    ExtensionNotLoaded {
        /// Name of the missing extension.
        name: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation attempted after shutdown began.
    #[error("Cannot send messages when shutting down")]
    ShuttingDown,

    /// `run` called on a hub that already closed.
    #[error("This hub instance was already closed")]
    AlreadyClosed,

    /// `run` called on a hub that is already running.
    #[error("This hub instance is already running")]
    AlreadyRunning,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a body decode error.
    #[inline]
    pub fn body_decode(message: impl Into<String>) -> Self {
        Self::BodyDecode {
            message: message.into(),
        }
    }

    /// Creates a handler error attributed to `extension`.
    #[inline]
    pub fn handler(extension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            extension: extension.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid event error.
    #[inline]
    pub fn invalid_event(name: impl Into<String>) -> Self {
        Self::InvalidEvent { name: name.into() }
    }

    /// Creates an extension not loaded error.
    #[inline]
    pub fn extension_not_loaded(name: impl Into<String>) -> Self {
        Self::ExtensionNotLoaded { name: name.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the connection cannot be used after this error.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }

    /// Returns `true` if this error signals misuse of the hub lifecycle.
    #[inline]
    #[must_use]
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::AlreadyClosed | Self::AlreadyRunning
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
