//! Control socket transport layer.
//!
//! This module handles communication with the window manager over its
//! Unix domain control socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Hub (Rust)     │        Unix socket           │  Window manager │
//! │                 │   request ──────────────►    │                 │
//! │  Connection     │   ◄────────────── reply      │  IPC server     │
//! │  + read loop    │   ◄────────────── events     │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`resolve_socket_path`] - Find the socket
//! 2. [`Connection::connect`] - Open it and start the read loop
//! 3. [`Connection::call`] / [`Connection::next_event`] - Exchange messages
//! 4. [`Connection::close`] - Tear down, failing every waiter
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Single-flight connection and read loop |
//! | `socket` | Socket path discovery |

// ============================================================================
// Submodules
// ============================================================================

/// Single-flight connection and read loop.
pub mod connection;

/// Control socket discovery.
pub mod socket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use socket::resolve_socket_path;
