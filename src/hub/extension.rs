//! Extension callback contract.
//!
//! An extension declares the events it listens to in
//! [`Extension::register`] and receives them through
//! [`Extension::on_event`]. Status refreshes go to
//! [`Extension::on_refresh`] with the array being built.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use i3hub::{EventName, Extension, HubHandle, Registrar, Result, WmEvent};
//! use serde_json::Value;
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl Extension for Logger {
//!     fn name(&self) -> &str {
//!         "logger"
//!     }
//!
//!     fn register(&self, registrar: &mut Registrar) -> Result<()> {
//!         registrar.listen(WmEvent::Window);
//!         Ok(())
//!     }
//!
//!     async fn on_event(&self, _hub: &HubHandle, event: &EventName, payload: &Value) -> Result<()> {
//!         println!("{event}: {payload}");
//!         Ok(())
//!     }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::EventName;
use crate::status::StatusArray;

use super::handle::HubHandle;

// ============================================================================
// Extension
// ============================================================================

/// A unit of behaviour plugged into the hub.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// Unique extension name; also the key of its configuration table.
    fn name(&self) -> &str;

    /// Declares the events this extension handles.
    ///
    /// # Errors
    ///
    /// An error aborts hub construction.
    fn register(&self, registrar: &mut Registrar) -> Result<()>;

    /// Returns `true` if the extension only makes sense when the hub runs
    /// as the bar's status command.
    fn status_only(&self) -> bool {
        false
    }

    /// Handles any registered event except `i3hub::refresh`.
    async fn on_event(&self, hub: &HubHandle, event: &EventName, payload: &Value) -> Result<()> {
        let _ = (hub, event, payload);
        Ok(())
    }

    /// Contributes items to the status array being built.
    async fn on_refresh(&self, hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
        let _ = (hub, status);
        Ok(())
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Collects the events one extension listens to.
#[derive(Debug, Default)]
pub struct Registrar {
    events: Vec<EventName>,
}

impl Registrar {
    /// Creates an empty registrar.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listens to `event`.
    ///
    /// Registering the same event twice delivers it twice.
    pub fn listen(&mut self, event: impl Into<EventName>) -> &mut Self {
        self.events.push(event.into());
        self
    }

    /// Listens to an event given by its namespaced name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`](crate::Error::InvalidEvent) for names
    /// outside the known namespaces.
    pub fn listen_to(&mut self, name: &str) -> Result<&mut Self> {
        let event = name.parse::<EventName>()?;
        Ok(self.listen(event))
    }

    /// Returns the collected events in registration order.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[EventName] {
        &self.events
    }

    pub(crate) fn into_events(self) -> Vec<EventName> {
        self.events
    }
}

// ============================================================================
// Tests
// ============================================================================
