//! Builder pattern for hub configuration.
//!
//! # Example
//!
//! ```no_run
//! use i3hub::Hub;
//! use i3hub::extensions::NopBinding;
//! use i3hub::transport::Connection;
//!
//! # async fn example() -> i3hub::Result<()> {
//! let conn = Connection::connect("/run/user/1000/i3/ipc-socket.1234").await?;
//! let hub = Hub::builder()
//!     .extension(NopBinding::shared())
//!     .status_io(tokio::io::stdout(), Some(tokio::io::stdin()))
//!     .build(conn)?;
//! hub.run().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::info;

use crate::config;
use crate::error::Result;
use crate::signals::SignalConfig;
use crate::transport::Connection;

use super::core::{ClickInput, Hub, StatusIo};
use super::extension::Extension;
use super::handle::Shared;
use super::registry::Registry;

// ============================================================================
// HubBuilder
// ============================================================================

/// Builder for configuring a [`Hub`] instance.
///
/// Use [`Hub::builder()`] to create a new builder.
#[derive(Default)]
pub struct HubBuilder {
    /// Extensions in load order.
    extensions: Vec<Arc<dyn Extension>>,
    /// Configuration sections keyed by extension name.
    sections: FxHashMap<String, Value>,
    /// Status output and click input, when running as status.
    status_io: Option<StatusIo>,
    /// Runtime directory override.
    runtime_dir: Option<PathBuf>,
    /// Suspend/resume signal numbers.
    signals: Option<SignalConfig>,
}

// ============================================================================
// HubBuilder Implementation
// ============================================================================

impl HubBuilder {
    /// Creates a new builder with no extensions.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an extension.
    ///
    /// Extensions are registered in the order they are added; a second
    /// extension with the same name is ignored.
    #[inline]
    #[must_use]
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Loads several extensions.
    #[must_use]
    pub fn extensions(mut self, extensions: impl IntoIterator<Item = Arc<dyn Extension>>) -> Self {
        self.extensions.extend(extensions);
        self
    }

    /// Sets the configuration section handed to extension `name` on init.
    #[inline]
    #[must_use]
    pub fn section(mut self, name: impl Into<String>, config: Value) -> Self {
        self.sections.insert(name.into(), config);
        self
    }

    /// Sets every configuration section at once.
    #[must_use]
    pub fn sections(mut self, sections: FxHashMap<String, Value>) -> Self {
        self.sections = sections;
        self
    }

    /// Runs the hub as the bar's status command.
    ///
    /// # Arguments
    ///
    /// * `output` - Where status lines are written (the bar reads our stdout)
    /// * `clicks` - Where click events are read from, if enabled
    #[must_use]
    pub fn status_io<W, R>(mut self, output: W, clicks: Option<R>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.status_io = Some(StatusIo {
            output: Box::new(output),
            clicks: clicks.map(|r| Box::new(r) as ClickInput),
        });
        self
    }

    /// Overrides the runtime directory.
    #[inline]
    #[must_use]
    pub fn runtime_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(path.into());
        self
    }

    /// Overrides the suspend/resume signals.
    #[inline]
    #[must_use]
    pub fn signals(mut self, signals: SignalConfig) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Registers the extensions and builds the hub over `conn`.
    ///
    /// Status-only extensions are skipped unless status output is set.
    ///
    /// # Errors
    ///
    /// Propagates an extension's registration error.
    pub fn build(self, conn: Connection) -> Result<Hub> {
        let running_as_status = self.status_io.is_some();

        let mut registry = Registry::new();
        for extension in self.extensions {
            if extension.status_only() && !running_as_status {
                info!(
                    extension = extension.name(),
                    "Skipping status-only extension"
                );
                continue;
            }
            registry.add(extension)?;
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            conn,
            registry,
            runtime_dir: self.runtime_dir.unwrap_or_else(config::runtime_dir),
            running_as_status,
            shutting_down: AtomicBool::new(false),
            control,
        });

        Ok(Hub::new(
            shared,
            control_rx,
            self.status_io,
            self.sections,
            self.signals.unwrap_or_default(),
        ))
    }
}

impl fmt::Debug for HubBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.extensions.iter().map(|e| e.name()).collect();
        f.debug_struct("HubBuilder")
            .field("extensions", &names)
            .field("sections", &self.sections)
            .field("status_io", &self.status_io.is_some())
            .field("runtime_dir", &self.runtime_dir)
            .field("signals", &self.signals)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
