//! Event catalogs and namespaced event names.
//!
//! Handlers subscribe to events in one of three namespaces:
//!
//! | Namespace | Example | Origin |
//! |-----------|---------|--------|
//! | `i3` | `i3::window` | upstream control socket |
//! | `i3hub` | `i3hub::refresh` | hub lifecycle |
//! | `extension` | `extension::nop_binding::switch-layout` | other extensions |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Namespace of upstream protocol events.
pub const WM_NAMESPACE: &str = "i3";

/// Namespace of lifecycle events synthesized by the hub.
pub const HUB_NAMESPACE: &str = "i3hub";

/// Namespace of extension-defined events.
pub const EXTENSION_NAMESPACE: &str = "extension";

/// Separator between namespace and event.
const SEPARATOR: &str = "::";

// ============================================================================
// WmEvent
// ============================================================================

/// Upstream event types, in wire ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WmEvent {
    /// Workspace focus or layout changed (`0`).
    Workspace,
    /// Output configuration changed (`1`).
    Output,
    /// Binding mode changed (`2`).
    Mode,
    /// Window state changed (`3`).
    Window,
    /// Bar configuration changed (`4`).
    BarconfigUpdate,
    /// A binding ran (`5`).
    Binding,
    /// The window manager is exiting or restarting (`6`).
    Shutdown,
    /// Tick sent by a client (`7`).
    Tick,
}

impl WmEvent {
    /// Every upstream event, indexed by ordinal.
    pub const ALL: [Self; 8] = [
        Self::Workspace,
        Self::Output,
        Self::Mode,
        Self::Window,
        Self::BarconfigUpdate,
        Self::Binding,
        Self::Shutdown,
        Self::Tick,
    ];

    /// Returns the wire ordinal.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Looks up an event by wire ordinal.
    #[inline]
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Returns the name used on the wire by `subscribe`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Output => "output",
            Self::Mode => "mode",
            Self::Window => "window",
            Self::BarconfigUpdate => "barconfig_update",
            Self::Binding => "binding",
            Self::Shutdown => "shutdown",
            Self::Tick => "tick",
        }
    }

    /// Looks up an event by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl fmt::Display for WmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// HubEvent
// ============================================================================

/// Lifecycle events synthesized by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEvent {
    /// Hub started; payload carries the extension's config section.
    Init,
    /// Hub is shutting down; payload is the reason.
    Shutdown,
    /// Status array is being rebuilt.
    Refresh,
    /// Bar asked the status source to stop.
    Suspend,
    /// Bar asked the status source to continue.
    Resume,
    /// Bar reported a click on a status item.
    Click,
}

impl HubEvent {
    /// Every lifecycle event.
    pub const ALL: [Self; 6] = [
        Self::Init,
        Self::Shutdown,
        Self::Refresh,
        Self::Suspend,
        Self::Resume,
        Self::Click,
    ];

    /// Returns the event name within the `i3hub` namespace.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Shutdown => "shutdown",
            Self::Refresh => "refresh",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Click => "click",
        }
    }

    /// Looks up a lifecycle event by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

// ============================================================================
// EventName
// ============================================================================

/// Fully qualified event name, the key handlers are registered under.
///
/// # Example
///
/// ```
/// use i3hub::protocol::{EventName, WmEvent};
///
/// let name: EventName = "i3::window".parse().unwrap();
/// assert_eq!(name, EventName::Wm(WmEvent::Window));
/// assert_eq!(name.to_string(), "i3::window");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Upstream event (`i3::<event>`).
    Wm(WmEvent),
    /// Lifecycle event (`i3hub::<event>`).
    Hub(HubEvent),
    /// Extension event (`extension::<extension>::<event>`), stored without
    /// the namespace prefix.
    Extension(String),
}

impl EventName {
    /// Creates an extension event name from `<extension>::<event>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if `name` is empty.
    pub fn extension(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_event(format!(
                "{EXTENSION_NAMESPACE}{SEPARATOR}"
            )));
        }
        Ok(Self::Extension(name))
    }

    /// Returns the key this name is dispatched under.
    ///
    /// The upstream `shutdown` event only reaches handlers through the
    /// lifecycle shutdown, so `i3::shutdown` folds into `i3hub::shutdown`.
    #[must_use]
    pub fn canonical(self) -> Self {
        match self {
            Self::Wm(WmEvent::Shutdown) => Self::Hub(HubEvent::Shutdown),
            other => other,
        }
    }

    /// Returns the upstream event a handler of this name needs subscribed.
    #[must_use]
    pub fn upstream(&self) -> Option<WmEvent> {
        match self {
            Self::Wm(event) => Some(*event),
            Self::Hub(HubEvent::Shutdown) => Some(WmEvent::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wm(event) => write!(f, "{WM_NAMESPACE}{SEPARATOR}{}", event.name()),
            Self::Hub(event) => write!(f, "{HUB_NAMESPACE}{SEPARATOR}{}", event.name()),
            Self::Extension(name) => write!(f, "{EXTENSION_NAMESPACE}{SEPARATOR}{name}"),
        }
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, event) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::invalid_event(s))?;

        match namespace {
            WM_NAMESPACE => WmEvent::from_name(event)
                .map(Self::Wm)
                .ok_or_else(|| Error::invalid_event(s)),
            HUB_NAMESPACE => HubEvent::from_name(event)
                .map(Self::Hub)
                .ok_or_else(|| Error::invalid_event(s)),
            EXTENSION_NAMESPACE => Self::extension(event),
            _ => Err(Error::invalid_event(s)),
        }
    }
}

impl From<WmEvent> for EventName {
    fn from(event: WmEvent) -> Self {
        Self::Wm(event)
    }
}

impl From<HubEvent> for EventName {
    fn from(event: HubEvent) -> Self {
        Self::Hub(event)
    }
}

// ============================================================================
// IncomingEvent
// ============================================================================

/// An entry of the connection's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    /// Event frame received from the peer.
    Wm {
        /// Event type.
        event: WmEvent,
        /// Decoded body.
        payload: Value,
    },
    /// The peer closed the socket.
    Eof,
}

// ============================================================================
// Tests
// ============================================================================
