//! Request message catalog.
//!
//! The control socket accepts a fixed set of message types addressed by
//! their ordinal. The ordinal is the type index written to the frame header.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// MessageType
// ============================================================================

/// Request message types, in wire ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Run a command (`0`).
    RunCommand,
    /// List workspaces (`1`).
    GetWorkspaces,
    /// Subscribe to events (`2`).
    Subscribe,
    /// List outputs (`3`).
    GetOutputs,
    /// Fetch the layout tree (`4`).
    GetTree,
    /// List marks (`5`).
    GetMarks,
    /// Fetch a bar configuration (`6`).
    GetBarConfig,
    /// Fetch the window manager version (`7`).
    GetVersion,
    /// List binding modes (`8`).
    GetBindingModes,
    /// Fetch the loaded configuration (`9`).
    GetConfig,
    /// Send a tick event (`10`).
    SendTick,
}

impl MessageType {
    /// Every message type, indexed by ordinal.
    pub const ALL: [Self; 11] = [
        Self::RunCommand,
        Self::GetWorkspaces,
        Self::Subscribe,
        Self::GetOutputs,
        Self::GetTree,
        Self::GetMarks,
        Self::GetBarConfig,
        Self::GetVersion,
        Self::GetBindingModes,
        Self::GetConfig,
        Self::SendTick,
    ];

    /// Returns the wire ordinal.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Looks up a message type by wire ordinal.
    #[inline]
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Returns the catalog name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RunCommand => "command",
            Self::GetWorkspaces => "get_workspaces",
            Self::Subscribe => "subscribe",
            Self::GetOutputs => "get_outputs",
            Self::GetTree => "get_tree",
            Self::GetMarks => "get_marks",
            Self::GetBarConfig => "get_bar_config",
            Self::GetVersion => "get_version",
            Self::GetBindingModes => "get_binding_modes",
            Self::GetConfig => "get_config",
            Self::SendTick => "send_tick",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Tests
// ============================================================================
