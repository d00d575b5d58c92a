//! Event name to handler routing.
//!
//! Handlers for one event name are kept in registration order. How a
//! dispatch walks that list depends on the [`DispatchMode`].
//!
//! | Mode | Order | On handler failure | Used for |
//! |------|-------|--------------------|----------|
//! | [`Concurrent`](DispatchMode::Concurrent) | none | logged | upstream events, clicks |
//! | [`Serial`](DispatchMode::Serial) | registration | chain aborted, error returned | refresh, suspend, resume, extension events |
//! | [`Sequential`](DispatchMode::Sequential) | registration | logged, chain continues | init, shutdown |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{EventName, HubEvent, WmEvent};
use crate::status::StatusArray;

use super::extension::{Extension, Registrar};
use super::handle::HubHandle;

// ============================================================================
// DispatchMode
// ============================================================================

/// How handlers of one event are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One task per handler.
    Concurrent,
    /// Registration order; the first failure stops the chain.
    Serial,
    /// Registration order; failures are logged and skipped.
    Sequential,
}

// ============================================================================
// Registration
// ============================================================================

/// One handler entry.
#[derive(Clone)]
pub struct Registration {
    /// Extension handling the event.
    pub extension: Arc<dyn Extension>,
    /// Global registration counter.
    pub ordinal: usize,
}

impl Registration {
    /// Returns the handling extension's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.extension.name()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("extension", &self.extension.name())
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Loaded extensions and their handlers.
#[derive(Default)]
pub struct Registry {
    extensions: Vec<Arc<dyn Extension>>,
    handlers: FxHashMap<EventName, Vec<Registration>>,
    next_ordinal: usize,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `extension` and registers the events it declares.
    ///
    /// Returns `false` (and loads nothing) if an extension with the same
    /// name is already loaded.
    ///
    /// # Errors
    ///
    /// Propagates the error of [`Extension::register`].
    pub fn add(&mut self, extension: Arc<dyn Extension>) -> Result<bool> {
        let name = extension.name().to_string();
        if self.extension(&name).is_some() {
            warn!(extension = %name, "Multiple extensions with this name, keeping the first");
            return Ok(false);
        }

        let mut registrar = Registrar::new();
        extension.register(&mut registrar)?;

        for event in registrar.into_events() {
            self.register(event, Arc::clone(&extension));
        }
        self.extensions.push(extension);

        debug!(extension = %name, "Extension registered");
        Ok(true)
    }

    /// Appends a handler for `event`.
    pub fn register(&mut self, event: EventName, extension: Arc<dyn Extension>) {
        let event = event.canonical();
        trace!(extension = extension.name(), %event, "Handler registered");

        let registration = Registration {
            extension,
            ordinal: self.next_ordinal,
        };
        self.next_ordinal += 1;
        self.handlers.entry(event).or_default().push(registration);
    }

    /// Returns the handlers of `event` in registration order.
    #[must_use]
    pub fn handlers(&self, event: &EventName) -> &[Registration] {
        self.handlers
            .get(&event.clone().canonical())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the upstream events any handler needs, in catalog order.
    #[must_use]
    pub fn upstream_events(&self) -> Vec<WmEvent> {
        let mut events: Vec<WmEvent> = self.handlers.keys().filter_map(EventName::upstream).collect();
        events.sort_unstable();
        events.dedup();
        events
    }

    /// Returns the loaded extension named `name`.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.extensions.iter().find(|e| e.name() == name).cloned()
    }

    /// Returns the loaded extensions in load order.
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Runs the handlers of `event` with `payload`.
    ///
    /// # Errors
    ///
    /// In [`DispatchMode::Serial`], the first handler error, attributed to
    /// its extension. Other modes never fail.
    pub async fn dispatch(
        &self,
        hub: &HubHandle,
        event: &EventName,
        payload: Value,
        mode: DispatchMode,
    ) -> Result<()> {
        match mode {
            DispatchMode::Concurrent => {
                self.dispatch_concurrent(hub, event, payload);
                Ok(())
            }
            DispatchMode::Serial => self.dispatch_serial(hub, event, &payload).await,
            DispatchMode::Sequential => {
                self.dispatch_sequential(hub, event, |_| payload.clone()).await;
                Ok(())
            }
        }
    }

    /// Spawns one task per handler of `event`.
    ///
    /// Returns the number of spawned handlers.
    pub fn dispatch_concurrent(&self, hub: &HubHandle, event: &EventName, payload: Value) -> usize {
        let handlers = self.handlers(event);
        if handlers.is_empty() {
            return 0;
        }

        let payload = Arc::new(payload);
        for registration in handlers {
            let extension = Arc::clone(&registration.extension);
            let hub = hub.clone();
            let event = event.clone();
            let payload = Arc::clone(&payload);

            tokio::spawn(async move {
                if let Err(e) = extension.on_event(&hub, &event, &payload).await {
                    let e = attribute(extension.as_ref(), e);
                    error!(extension = extension.name(), %event, error = %e, "Event handler failed");
                }
            });
        }

        handlers.len()
    }

    /// Runs the handlers of `event` one after another, stopping at the
    /// first failure.
    pub async fn dispatch_serial(&self, hub: &HubHandle, event: &EventName, payload: &Value) -> Result<()> {
        for registration in self.handlers(event) {
            registration
                .extension
                .on_event(hub, event, payload)
                .await
                .map_err(|e| attribute(registration.extension.as_ref(), e))?;
        }
        Ok(())
    }

    /// Runs the handlers of `event` one after another with a payload built
    /// per extension, logging failures.
    ///
    /// Returns the number of failed handlers.
    pub async fn dispatch_sequential<F>(&self, hub: &HubHandle, event: &EventName, payload_for: F) -> usize
    where
        F: Fn(&str) -> Value,
    {
        let mut failures = 0;
        for registration in self.handlers(event) {
            let payload = payload_for(registration.name());
            if let Err(e) = registration.extension.on_event(hub, event, &payload).await {
                let e = attribute(registration.extension.as_ref(), e);
                error!(extension = registration.name(), %event, error = %e, "Event handler failed");
                failures += 1;
            }
        }
        failures
    }

    /// Runs the refresh handlers over `status`, stopping at the first
    /// failure.
    ///
    /// Items merged before the failure stay in `status`.
    pub async fn refresh(&self, hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
        for registration in self.handlers(&EventName::Hub(HubEvent::Refresh)) {
            registration
                .extension
                .on_refresh(hub, status)
                .await
                .map_err(|e| attribute(registration.extension.as_ref(), e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.extensions.iter().map(|e| e.name()).collect();
        f.debug_struct("Registry")
            .field("extensions", &names)
            .field("events", &self.handlers.len())
            .finish()
    }
}

/// Tags `error` with the extension that raised it.
fn attribute(extension: &dyn Extension, error: Error) -> Error {
    match error {
        Error::Handler { .. } => error,
        other => Error::handler(extension.name(), other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::status::StatusItem;

    type Log = mpsc::UnboundedSender<(String, String)>;

    /// Records every delivery; optionally fails or merges an item.
    struct Probe {
        name: &'static str,
        events: Vec<EventName>,
        log: Log,
        fail: bool,
    }

    impl Probe {
        fn new(name: &'static str, events: Vec<EventName>, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                events,
                log: log.clone(),
                fail: false,
            })
        }

        fn failing(name: &'static str, events: Vec<EventName>, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                events,
                log: log.clone(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Extension for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn register(&self, registrar: &mut Registrar) -> Result<()> {
            for event in &self.events {
                registrar.listen(event.clone());
            }
            Ok(())
        }

        async fn on_event(&self, _hub: &HubHandle, event: &EventName, payload: &Value) -> Result<()> {
            let _ = self.log.send((self.name.to_string(), format!("{event} {payload}")));
            if self.fail {
                return Err(Error::config("probe failure"));
            }
            Ok(())
        }

        async fn on_refresh(&self, _hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
            let _ = self.log.send((self.name.to_string(), "refresh".to_string()));
            if self.fail {
                return Err(Error::config("probe failure"));
            }
            status.merge(StatusItem::new(self.name, "ok"));
            Ok(())
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            out.push(entry);
        }
        out
    }

    fn window() -> EventName {
        EventName::Wm(WmEvent::Window)
    }

    #[test]
    fn test_upstream_events_in_catalog_order() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry
            .add(Probe::new(
                "a",
                vec![
                    EventName::Hub(HubEvent::Shutdown),
                    window(),
                    EventName::Hub(HubEvent::Init),
                ],
                &tx,
            ))
            .unwrap();
        registry
            .add(Probe::new("b", vec![window(), EventName::Wm(WmEvent::Workspace)], &tx))
            .unwrap();

        assert_eq!(
            registry.upstream_events(),
            [WmEvent::Workspace, WmEvent::Window, WmEvent::Shutdown]
        );
    }

    #[test]
    fn test_wm_shutdown_registers_as_lifecycle_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry
            .add(Probe::new("a", vec![EventName::Wm(WmEvent::Shutdown)], &tx))
            .unwrap();

        assert_eq!(registry.handlers(&EventName::Hub(HubEvent::Shutdown)).len(), 1);
        assert_eq!(registry.upstream_events(), [WmEvent::Shutdown]);
    }

    #[test]
    fn test_duplicate_extension_keeps_first() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        assert!(registry.add(Probe::new("a", vec![window()], &tx)).unwrap());
        assert!(!registry
            .add(Probe::new("a", vec![EventName::Wm(WmEvent::Tick)], &tx))
            .unwrap());

        assert_eq!(registry.extensions().len(), 1);
        assert!(registry.handlers(&EventName::Wm(WmEvent::Tick)).is_empty());
    }

    #[test]
    fn test_registration_order_and_no_dedup() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry.add(Probe::new("a", vec![window(), window()], &tx)).unwrap();
        registry.add(Probe::new("b", vec![window()], &tx)).unwrap();

        let handlers = registry.handlers(&window());
        let names: Vec<_> = handlers.iter().map(Registration::name).collect();
        assert_eq!(names, ["a", "a", "b"]);
        assert!(handlers.windows(2).all(|w| w[0].ordinal < w[1].ordinal));
    }

    #[tokio::test]
    async fn test_serial_stops_at_first_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry.add(Probe::new("a", vec![window()], &tx)).unwrap();
        registry.add(Probe::failing("b", vec![window()], &tx)).unwrap();
        registry.add(Probe::new("c", vec![window()], &tx)).unwrap();
        let hub = HubHandle::detached();

        let result = registry
            .dispatch(&hub, &window(), json!(1), DispatchMode::Serial)
            .await;

        match result {
            Err(Error::Handler { extension, .. }) => assert_eq!(extension, "b"),
            other => panic!("unexpected result: {other:?}"),
        }
        let names: Vec<_> = drain(&mut rx).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_sequential_continues_after_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        let init = EventName::Hub(HubEvent::Init);
        registry.add(Probe::failing("a", vec![init.clone()], &tx)).unwrap();
        registry.add(Probe::new("b", vec![init.clone()], &tx)).unwrap();
        let hub = HubHandle::detached();

        let failures = registry
            .dispatch_sequential(&hub, &init, |name| json!({ "for": name }))
            .await;

        assert_eq!(failures, 1);
        assert_eq!(
            drain(&mut rx),
            [
                ("a".to_string(), r#"i3hub::init {"for":"a"}"#.to_string()),
                ("b".to_string(), r#"i3hub::init {"for":"b"}"#.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_failure_does_not_block_others() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry.add(Probe::failing("a", vec![window()], &tx)).unwrap();
        registry.add(Probe::new("b", vec![window()], &tx)).unwrap();
        let hub = HubHandle::detached();

        let spawned = registry.dispatch_concurrent(&hub, &window(), json!([1]));
        assert_eq!(spawned, 2);

        let mut names = Vec::new();
        for _ in 0..2 {
            let (name, text) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("handler ran")
                .expect("entry");
            assert_eq!(text, "i3::window [1]");
            names.push(name);
        }
        names.sort();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_refresh_keeps_partial_array() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let refresh = EventName::Hub(HubEvent::Refresh);
        let mut registry = Registry::new();
        registry.add(Probe::new("a", vec![refresh.clone()], &tx)).unwrap();
        registry.add(Probe::failing("b", vec![refresh.clone()], &tx)).unwrap();
        registry.add(Probe::new("c", vec![refresh], &tx)).unwrap();
        let hub = HubHandle::detached();

        let mut status = StatusArray::new();
        assert!(registry.refresh(&hub, &mut status).await.is_err());
        assert!(status.get("a").is_some());
        assert!(status.get("c").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_without_handlers() {
        let registry = Registry::new();
        let hub = HubHandle::detached();
        let event = EventName::extension("x::y").unwrap();

        assert!(registry
            .dispatch(&hub, &event, Value::Null, DispatchMode::Serial)
            .await
            .is_ok());
        assert_eq!(registry.dispatch_concurrent(&hub, &event, Value::Null), 0);
    }
}
