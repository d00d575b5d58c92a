//! Keyboard layout switcher with a status item.
//!
//! # Configuration
//!
//! ```toml
//! [keyboard_layout]
//! layouts = ["us", "de"]
//! extra-xkb-opts = "-option ctrl:nocaps"
//! ```
//!
//! Switches to the next layout on a click of its status item or on
//! `extension::nop_binding::switch-layout`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::hub::{Extension, HubHandle, Registrar};
use crate::protocol::{EventName, HubEvent};
use crate::status::{StatusArray, StatusItem};

use super::NopBinding;

// ============================================================================
// Constants
// ============================================================================

/// Name of the status item.
pub const ITEM_NAME: &str = "keyboard_layout";

/// Keyboard glyph shown before the layout.
const KEYBOARD_ICON: char = '\u{f11c}';

/// Event emitted by [`NopBinding`] for `nop switch-layout`.
const SWITCH_EVENT: &str = "switch-layout";

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Options {
    layouts: Vec<String>,
    extra_xkb_opts: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            layouts: vec!["us".to_string()],
            extra_xkb_opts: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    options: Options,
    current: Option<usize>,
}

// ============================================================================
// KeyboardLayout
// ============================================================================

/// Cycles keyboard layouts through `setxkbmap`.
#[derive(Debug, Default)]
pub struct KeyboardLayout {
    state: Mutex<State>,
}

impl KeyboardLayout {
    /// Extension name.
    pub const NAME: &'static str = "keyboard_layout";

    /// Creates a shared instance.
    #[must_use]
    pub fn shared() -> Arc<dyn Extension> {
        Arc::new(Self::default())
    }

    /// Returns the active layout, if any was selected yet.
    #[must_use]
    pub fn current_layout(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .current
            .and_then(|i| state.options.layouts.get(i).cloned())
    }

    fn configure(&self, payload: &Value) -> Result<()> {
        let options = match payload.get("config") {
            Some(config) => Options::deserialize(config)
                .map_err(|e| Error::handler(Self::NAME, format!("invalid configuration: {e}")))?,
            None => Options::default(),
        };
        if options.layouts.is_empty() {
            return Err(Error::handler(Self::NAME, "no layouts configured"));
        }

        let mut state = self.state.lock();
        state.options = options;
        state.current = None;
        Ok(())
    }

    /// Advances to the next layout and applies it.
    async fn switch_layout(&self, hub: &HubHandle) -> Result<()> {
        let command = {
            let mut state = self.state.lock();
            let count = state.options.layouts.len();
            let next = state.current.map_or(0, |i| (i + 1) % count);
            state.current = Some(next);
            format!(
                "exec setxkbmap {} {}",
                state.options.layouts[next], state.options.extra_xkb_opts
            )
        };

        info!(command = command.trim_end(), "Switching keyboard layout");
        hub.command(command.trim_end()).await?;
        hub.refresh_status()
    }
}

#[async_trait]
impl Extension for KeyboardLayout {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn register(&self, registrar: &mut Registrar) -> Result<()> {
        registrar
            .listen(HubEvent::Init)
            .listen(HubEvent::Click)
            .listen(HubEvent::Refresh)
            .listen(EventName::extension(format!(
                "{}::{SWITCH_EVENT}",
                NopBinding::NAME
            ))?);
        Ok(())
    }

    fn status_only(&self) -> bool {
        true
    }

    async fn on_event(&self, hub: &HubHandle, event: &EventName, payload: &Value) -> Result<()> {
        match event {
            EventName::Hub(HubEvent::Init) => {
                hub.require(NopBinding::NAME)?;
                self.configure(payload)?;
                self.switch_layout(hub).await
            }
            EventName::Hub(HubEvent::Click) => {
                if payload.get("name").and_then(Value::as_str) == Some(ITEM_NAME) {
                    self.switch_layout(hub).await?;
                }
                Ok(())
            }
            EventName::Extension(_) => self.switch_layout(hub).await,
            _ => Ok(()),
        }
    }

    async fn on_refresh(&self, _hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
        if let Some(layout) = self.current_layout() {
            status.merge(StatusItem::new(ITEM_NAME, format!("{KEYBOARD_ICON} {layout}")));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
