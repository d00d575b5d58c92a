//! Turns `nop` key bindings into extension events.
//!
//! A binding such as
//!
//! ```text
//! bindsym $mod+space nop switch-layout
//! ```
//!
//! emits `extension::nop_binding::switch-layout` with the remaining words
//! of the command (here `[]`) as payload.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::hub::{Extension, HubHandle, Registrar};
use crate::protocol::{EventName, WmEvent};

// ============================================================================
// NopBinding
// ============================================================================

/// Emits `extension::nop_binding::<event>` for every `nop <event>` binding
/// that runs.
#[derive(Debug, Default)]
pub struct NopBinding;

impl NopBinding {
    /// Extension name.
    pub const NAME: &'static str = "nop_binding";

    /// Creates a shared instance.
    #[must_use]
    pub fn shared() -> Arc<dyn Extension> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Extension for NopBinding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn register(&self, registrar: &mut Registrar) -> Result<()> {
        registrar.listen(WmEvent::Binding);
        Ok(())
    }

    async fn on_event(&self, hub: &HubHandle, _event: &EventName, payload: &Value) -> Result<()> {
        let Some((event, args)) = nop_event(payload) else {
            return Ok(());
        };

        debug!(%event, ?args, "Nop binding ran");
        hub.emit_event(&format!("{}::{event}", Self::NAME), Value::from(args))
            .await
    }
}

/// Extracts `(event, args)` from a binding event running `nop <event> ...`.
fn nop_event(payload: &Value) -> Option<(String, Vec<String>)> {
    if payload.get("change").and_then(Value::as_str) != Some("run") {
        return None;
    }

    let command = payload.pointer("/binding/command")?.as_str()?;
    let mut words = split_command(command).into_iter();
    if words.next().as_deref() != Some("nop") {
        return None;
    }

    let event = words.next()?;
    Some((event, words.collect()))
}

/// Splits a command line into words, honouring quotes and backslashes.
fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    word.push(next);
                }
                in_word = true;
            }
            (Some(_), c) => word.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(word);
    }
    words
}

// ============================================================================
// Tests
// ============================================================================
