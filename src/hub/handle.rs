//! Extension-facing hub API.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::EventName;
use crate::transport::Connection;

use super::extension::Extension;
use super::registry::{DispatchMode, Registry};

// ============================================================================
// Control
// ============================================================================

/// Requests processed by the hub's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// Build and write a status line.
    Refresh,
    /// The bar asked us to stop writing.
    Suspend,
    /// The bar asked us to continue.
    Resume,
    /// Shut the hub down.
    Close,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared by the hub and every handle.
pub(crate) struct Shared {
    pub(crate) conn: Connection,
    pub(crate) registry: Registry,
    pub(crate) runtime_dir: PathBuf,
    pub(crate) running_as_status: bool,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) control: mpsc::UnboundedSender<Control>,
}

// ============================================================================
// HubHandle
// ============================================================================

/// Handle passed to extension callbacks.
///
/// Cheap to clone. Every operation fails with [`Error::ShuttingDown`] once
/// the hub started shutting down.
#[derive(Clone)]
pub struct HubHandle {
    shared: Arc<Shared>,
}

impl HubHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Handle over a connection to nowhere, for unit tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::detached_with_control().0
    }

    /// Like [`detached`](Self::detached), also returning the control queue.
    #[cfg(test)]
    pub(crate) fn detached_with_control() -> (Self, mpsc::UnboundedReceiver<Control>) {
        let (stream, _peer) = tokio::io::duplex(64);
        let (control, control_rx) = mpsc::unbounded_channel();
        let handle = Self::new(Arc::new(Shared {
            conn: Connection::from_stream(stream),
            registry: Registry::new(),
            runtime_dir: std::env::temp_dir(),
            running_as_status: false,
            shutting_down: AtomicBool::new(false),
            control,
        }));
        (handle, control_rx)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    fn send(&self, control: Control) -> Result<()> {
        self.ensure_running()?;
        self.shared
            .control
            .send(control)
            .map_err(|_| Error::ShuttingDown)
    }

    /// Returns `true` once shutdown began.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns `true` if the hub is the bar's status command.
    #[inline]
    #[must_use]
    pub fn running_as_status(&self) -> bool {
        self.shared.running_as_status
    }

    /// Returns the per-user runtime directory.
    #[inline]
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.shared.runtime_dir
    }

    /// Returns the loaded extension named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtensionNotLoaded`] if no such extension is loaded.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Extension>> {
        self.ensure_running()?;
        self.shared
            .registry
            .extension(name)
            .ok_or_else(|| Error::extension_not_loaded(name))
    }

    /// Queues a status refresh cycle.
    pub fn refresh_status(&self) -> Result<()> {
        self.send(Control::Refresh)
    }

    /// Dispatches `extension::<name>` to its handlers, one after another.
    ///
    /// `name` has the form `<extension>::<event>`.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure; later handlers do not run.
    pub async fn emit_event(&self, name: &str, payload: Value) -> Result<()> {
        self.ensure_running()?;
        let event = EventName::extension(name)?;
        debug!(%event, "Emitting extension event");
        self.shared
            .registry
            .dispatch(self, &event, payload, DispatchMode::Serial)
            .await
    }

    /// Asks the hub to shut down.
    pub fn close(&self) -> Result<()> {
        self.send(Control::Close)
    }

    pub(crate) fn suspend(&self) -> Result<()> {
        self.send(Control::Suspend)
    }

    pub(crate) fn resume(&self) -> Result<()> {
        self.send(Control::Resume)
    }
}

// ============================================================================
// Window Manager Messages
// ============================================================================

impl HubHandle {
    /// Runs a command.
    pub async fn command(&self, command: &str) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.command(command).await
    }

    /// Returns the workspace list.
    pub async fn get_workspaces(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_workspaces().await
    }

    /// Returns the output list.
    pub async fn get_outputs(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_outputs().await
    }

    /// Returns the layout tree.
    pub async fn get_tree(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_tree().await
    }

    /// Returns the set marks.
    pub async fn get_marks(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_marks().await
    }

    /// Returns the bar ids, or one bar's configuration.
    pub async fn get_bar_config(&self, name: Option<&str>) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_bar_config(name).await
    }

    /// Returns the window manager version.
    pub async fn get_version(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_version().await
    }

    /// Returns the binding mode names.
    pub async fn get_binding_modes(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_binding_modes().await
    }

    /// Returns the loaded configuration.
    pub async fn get_config(&self) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.get_config().await
    }

    /// Sends a tick event to every subscriber.
    pub async fn send_tick(&self, payload: Option<&str>) -> Result<Value> {
        self.ensure_running()?;
        self.shared.conn.send_tick(payload).await
    }
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("running_as_status", &self.shared.running_as_status)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
