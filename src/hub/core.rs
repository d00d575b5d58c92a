//! Hub lifecycle and event loop.
//!
//! ```text
//! Idle ──run──► Starting ──► Running ──► ShuttingDown ──► Closed
//!   │                                                       ▲
//!   └──────────────────────────close────────────────────────┘
//! ```
//!
//! - **Starting**: one `subscribe` with every upstream event any handler
//!   needs, the status header when running as status, then `i3hub::init`.
//! - **Running**: upstream events, click events and control requests are
//!   served until the peer shuts down, the connection ends or the hub is
//!   closed.
//! - **ShuttingDown**: `i3hub::shutdown` runs once, then the connection and
//!   the status output are closed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{EventName, HubEvent, IncomingEvent, WmEvent};
use crate::signals::SignalConfig;
use crate::status::{StatusArray, StatusHeader, StatusWriter, click_events};

use super::builder::HubBuilder;
use super::handle::{Control, HubHandle, Shared};

// ============================================================================
// Types
// ============================================================================

/// Status output (the bar's input).
pub(crate) type StatusOutput = Box<dyn AsyncWrite + Send + Unpin>;

/// Click input (the bar's output).
pub(crate) type ClickInput = Box<dyn AsyncRead + Send + Unpin>;

/// Streams connecting the hub to the bar.
pub(crate) struct StatusIo {
    pub(crate) output: StatusOutput,
    pub(crate) clicks: Option<ClickInput>,
}

// ============================================================================
// HubState
// ============================================================================

/// Lifecycle state of a [`Hub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    /// Built, not yet run.
    Idle,
    /// Subscribing and initializing extensions.
    Starting,
    /// Serving events.
    Running,
    /// Running shutdown handlers.
    ShuttingDown,
    /// Terminal.
    Closed,
}

// ============================================================================
// Hub
// ============================================================================

/// Routes window manager events and lifecycle events to extensions.
///
/// # Example
///
/// ```no_run
/// use i3hub::Hub;
/// use i3hub::transport::{Connection, resolve_socket_path};
///
/// # async fn example() -> i3hub::Result<()> {
/// let path = resolve_socket_path(None).await?;
/// let conn = Connection::connect(path).await?;
/// let hub = Hub::builder().build(conn)?;
/// hub.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Hub {
    shared: Arc<Shared>,
    state: Mutex<HubState>,
    control: Mutex<Option<mpsc::UnboundedReceiver<Control>>>,
    status_io: Mutex<Option<StatusIo>>,
    sections: FxHashMap<String, Value>,
    signals: SignalConfig,
}

/// Why the event loop ended.
struct Exit {
    reason: Value,
    error: Option<Error>,
}

impl Exit {
    fn new(reason: impl Into<Value>) -> Self {
        Self {
            reason: reason.into(),
            error: None,
        }
    }

    fn failed(error: Error) -> Self {
        Self {
            reason: Value::from("error"),
            error: Some(error),
        }
    }
}

/// Status side state owned by [`Hub::run`].
struct Session {
    writer: Option<StatusWriter<StatusOutput>>,
    clicks: Option<BoxStream<'static, Value>>,
    suspended: bool,
    deferred: Option<StatusArray>,
}

impl Session {
    fn new(io: Option<StatusIo>) -> Self {
        let (writer, clicks) = match io {
            Some(io) => (
                Some(StatusWriter::new(io.output)),
                io.clicks.map(click_events),
            ),
            None => (None, None),
        };

        Self {
            writer,
            clicks,
            suspended: false,
            deferred: None,
        }
    }
}

impl Hub {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    pub(crate) fn new(
        shared: Arc<Shared>,
        control: mpsc::UnboundedReceiver<Control>,
        status_io: Option<StatusIo>,
        sections: FxHashMap<String, Value>,
        signals: SignalConfig,
    ) -> Self {
        Self {
            shared,
            state: Mutex::new(HubState::Idle),
            control: Mutex::new(Some(control)),
            status_io: Mutex::new(status_io),
            sections,
            signals,
        }
    }

    /// Returns a handle for extensions and signal listeners.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> HubHandle {
        HubHandle::new(Arc::clone(&self.shared))
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> HubState {
        *self.state.lock()
    }

    /// Returns `true` if the hub writes a status stream.
    #[inline]
    #[must_use]
    pub fn running_as_status(&self) -> bool {
        self.shared.running_as_status
    }

    fn set_state(&self, state: HubState) {
        trace!(?state, "Hub state changed");
        *self.state.lock() = state;
    }

    /// Runs the hub until it shuts down.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClosed`] if the hub already ran or was closed
    /// - [`Error::AlreadyRunning`] if another `run` is in progress
    /// - The fatal connection or status output error that ended the loop
    pub async fn run(&self) -> Result<()> {
        self.begin()?;
        let Some(mut control) = self.control.lock().take() else {
            return Err(Error::AlreadyRunning);
        };
        let mut session = Session::new(self.status_io.lock().take());
        let handle = self.handle();

        info!(running_as_status = self.running_as_status(), "Hub starting");

        let exit = match self.start(&handle, &mut session).await {
            Ok(()) => {
                self.set_state(HubState::Running);
                info!("Hub running");
                self.event_loop(&handle, &mut session, &mut control).await
            }
            Err(e) => {
                error!(error = %e, "Hub failed to start");
                Exit::failed(e)
            }
        };

        self.shutdown(&handle, &mut session, exit.reason).await;

        match exit.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Shuts the hub down.
    ///
    /// A running hub finishes its current step, runs the shutdown handlers
    /// and returns from [`run`](Self::run). A hub that never ran closes its
    /// connection directly. No-op once shutdown began.
    pub async fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            match *state {
                HubState::Idle => {
                    *state = HubState::Closed;
                    true
                }
                HubState::Starting | HubState::Running => false,
                HubState::ShuttingDown | HubState::Closed => return,
            }
        };

        if idle {
            self.shared.shutting_down.store(true, Ordering::SeqCst);
            self.status_io.lock().take();
            self.shared.conn.close().await;
            info!("Hub closed before running");
            return;
        }

        let _ = self.shared.control.send(Control::Close);
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            HubState::Idle => {
                *state = HubState::Starting;
                Ok(())
            }
            HubState::ShuttingDown | HubState::Closed => Err(Error::AlreadyClosed),
            HubState::Starting | HubState::Running => Err(Error::AlreadyRunning),
        }
    }

    async fn start(&self, handle: &HubHandle, session: &mut Session) -> Result<()> {
        let events = self.shared.registry.upstream_events();
        let reply = self.shared.conn.subscribe(&events).await?;
        if reply.get("success").and_then(Value::as_bool) == Some(true) {
            debug!(?events, "Subscribed to window manager events");
        } else {
            warn!(?events, %reply, "Subscription was not acknowledged");
        }

        if let Some(writer) = session.writer.as_mut() {
            let header =
                StatusHeader::new(self.signals.stop, self.signals.cont, session.clicks.is_some());
            writer.write_header(&header).await?;
        }

        let running_as_status = self.running_as_status();
        let failures = self
            .shared
            .registry
            .dispatch_sequential(handle, &EventName::Hub(HubEvent::Init), |name| {
                let config = self.sections.get(name).cloned().unwrap_or_else(|| json!({}));
                json!({ "running_as_status": running_as_status, "config": config })
            })
            .await;
        if failures > 0 {
            warn!(failures, "Some extensions failed to initialize");
        }

        Ok(())
    }

    async fn event_loop(
        &self,
        handle: &HubHandle,
        session: &mut Session,
        control: &mut mpsc::UnboundedReceiver<Control>,
    ) -> Exit {
        let conn = &self.shared.conn;
        let registry = &self.shared.registry;

        loop {
            tokio::select! {
                incoming = conn.next_event() => match incoming {
                    Ok(IncomingEvent::Wm { event: WmEvent::Shutdown, payload }) => {
                        info!(%payload, "Window manager is shutting down");
                        return Exit::new(payload);
                    }
                    Ok(IncomingEvent::Wm { event, payload }) => {
                        registry.dispatch_concurrent(handle, &EventName::Wm(event), payload);
                    }
                    Ok(IncomingEvent::Eof) => {
                        info!("Window manager closed the connection");
                        return Exit::new("eof");
                    }
                    Err(e @ Error::BodyDecode { .. }) => {
                        warn!(error = %e, "Dropping malformed event");
                    }
                    Err(e) => {
                        error!(error = %e, "Connection failed");
                        return Exit::failed(e);
                    }
                },

                Some(request) = control.recv() => {
                    let result = match request {
                        Control::Refresh => self.refresh(handle, session).await,
                        Control::Suspend => {
                            self.suspend(handle, session).await;
                            Ok(())
                        }
                        Control::Resume => self.resume(handle, session).await,
                        Control::Close => {
                            info!("Close requested");
                            return Exit::new("close");
                        }
                    };
                    if let Err(e) = result {
                        error!(error = %e, "Status output failed");
                        return Exit::failed(e);
                    }
                }

                click = next_click(&mut session.clicks) => {
                    trace!(%click, "Click event received");
                    registry.dispatch_concurrent(handle, &EventName::Hub(HubEvent::Click), click);
                }
            }
        }
    }

    /// Builds a fresh status array and writes it, or keeps it while
    /// suspended.
    async fn refresh(&self, handle: &HubHandle, session: &mut Session) -> Result<()> {
        let Some(writer) = session.writer.as_mut() else {
            debug!("Ignoring status refresh, not running as status");
            return Ok(());
        };

        let mut status = StatusArray::new();
        if let Err(e) = self.shared.registry.refresh(handle, &mut status).await {
            error!(error = %e, "Status refresh aborted");
        }

        if session.suspended {
            trace!("Status output suspended, deferring");
            session.deferred = Some(status);
            return Ok(());
        }

        writer.write_status(&status).await
    }

    async fn suspend(&self, handle: &HubHandle, session: &mut Session) {
        if session.suspended {
            return;
        }
        session.suspended = true;
        info!("Status output suspended");

        let event = EventName::Hub(HubEvent::Suspend);
        if let Err(e) = self.shared.registry.dispatch_serial(handle, &event, &Value::Null).await {
            error!(error = %e, "Suspend handlers aborted");
        }
    }

    async fn resume(&self, handle: &HubHandle, session: &mut Session) -> Result<()> {
        if !session.suspended {
            return Ok(());
        }
        session.suspended = false;
        info!("Status output resumed");

        let event = EventName::Hub(HubEvent::Resume);
        if let Err(e) = self.shared.registry.dispatch_serial(handle, &event, &Value::Null).await {
            error!(error = %e, "Resume handlers aborted");
        }

        if let (Some(status), Some(writer)) = (session.deferred.take(), session.writer.as_mut()) {
            writer.write_status(&status).await?;
        }
        Ok(())
    }

    /// Runs the shutdown handlers once and releases every resource.
    async fn shutdown(&self, handle: &HubHandle, session: &mut Session, reason: Value) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(HubState::ShuttingDown);
        info!(%reason, "Hub shutting down");

        self.shared
            .registry
            .dispatch_sequential(handle, &EventName::Hub(HubEvent::Shutdown), |_| reason.clone())
            .await;

        self.shared.conn.close().await;
        session.clicks = None;
        if let Some(mut writer) = session.writer.take()
            && let Err(e) = writer.shutdown().await
        {
            debug!(error = %e, "Failed to close status output");
        }

        self.set_state(HubState::Closed);
        info!("Hub stopped");
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("state", &self.state())
            .field("registry", &self.shared.registry)
            .field("running_as_status", &self.shared.running_as_status)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

/// Waits for the next click; pending forever once input ended.
async fn next_click(clicks: &mut Option<BoxStream<'static, Value>>) -> Value {
    loop {
        let Some(stream) = clicks.as_mut() else {
            return std::future::pending().await;
        };
        match stream.next().await {
            Some(click) => return click,
            None => *clicks = None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
    use tokio::task::JoinHandle;

    use crate::hub::{Extension, Registrar};
    use crate::protocol::MessageType;
    use crate::status::StatusItem;
    use crate::transport::mock::MockPeer;

    type Entry = (String, EventName, Value);
    type Log = mpsc::UnboundedSender<Entry>;

    /// Records deliveries and merges a counter on refresh.
    struct Recorder {
        name: &'static str,
        events: Vec<EventName>,
        log: Log,
        fail: bool,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl Extension for Recorder {
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
            let _ = self.log.send((self.name.to_string(), event.clone(), payload.clone()));
            if self.fail {
                return Err(Error::handler(self.name, "recorder failure"));
            }
            Ok(())
        }

        async fn on_refresh(&self, _hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
            if self.fail {
                return Err(Error::handler(self.name, "recorder failure"));
            }
            let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            status.merge(StatusItem::new(self.name, count.to_string()));
            Ok(())
        }
    }

    fn recorder<const N: usize>(name: &'static str, events: [EventName; N], log: &Log) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            events: events.to_vec(),
            log: log.clone(),
            fail: false,
            refreshes: AtomicUsize::new(0),
        })
    }

    fn failing<const N: usize>(name: &'static str, events: [EventName; N], log: &Log) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            events: events.to_vec(),
            log: log.clone(),
            fail: true,
            refreshes: AtomicUsize::new(0),
        })
    }

    fn wm(event: WmEvent) -> EventName {
        EventName::Wm(event)
    }

    fn lifecycle(event: HubEvent) -> EventName {
        EventName::Hub(event)
    }

    fn spawn_run(hub: &Arc<Hub>) -> JoinHandle<Result<()>> {
        let hub = Arc::clone(hub);
        tokio::spawn(async move { hub.run().await })
    }

    async fn next_entry(rx: &mut mpsc::UnboundedReceiver<Entry>) -> Entry {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("handler ran")
            .expect("log open")
    }

    async fn finish(run: JoinHandle<Result<()>>) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run finished")
            .expect("run task")
    }

    async fn acknowledge(peer: &mut MockPeer, events: &str) {
        peer.expect_request(MessageType::Subscribe, events).await;
        peer.reply(MessageType::Subscribe, r#"{"success":true}"#).await;
    }

    /// The bar's side of the status streams.
    struct Bar {
        lines: Lines<BufReader<DuplexStream>>,
        clicks: DuplexStream,
    }

    impl Bar {
        async fn line(&mut self) -> String {
            tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("status line")
                .expect("read")
                .expect("not eof")
        }
    }

    fn status_hub(builder: HubBuilder, conn: crate::transport::Connection) -> (Arc<Hub>, Bar) {
        let (output, bar_input) = tokio::io::duplex(4096);
        let (click_input, bar_output) = tokio::io::duplex(4096);
        let hub = builder
            .signals(SignalConfig::new(40, 39))
            .status_io(output, Some(click_input))
            .build(conn)
            .expect("hub");
        let bar = Bar {
            lines: BufReader::new(bar_input).lines(),
            clicks: bar_output,
        };
        (Arc::new(hub), bar)
    }

    #[tokio::test]
    async fn test_window_event_reaches_handler_once() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder(
                    "rec",
                    [wm(WmEvent::Window), lifecycle(HubEvent::Shutdown)],
                    &log,
                ))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, r#"["window","shutdown"]"#).await;
        peer.send_event(WmEvent::Window, "[1]").await;

        let (name, event, payload) = next_entry(&mut rx).await;
        assert_eq!(name, "rec");
        assert_eq!(event, wm(WmEvent::Window));
        assert_eq!(payload, json!([1]));

        peer.send_event(WmEvent::Shutdown, r#"{"change":"exit"}"#).await;
        let (_, event, payload) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Shutdown));
        assert_eq!(payload, json!({"change": "exit"}));

        finish(run).await.expect("clean exit");
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test]
    async fn test_eof_shuts_down_once() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("rec", [lifecycle(HubEvent::Shutdown)], &log))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, r#"["shutdown"]"#).await;
        drop(peer);

        let (_, event, payload) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Shutdown));
        assert_eq!(payload, json!("eof"));

        finish(run).await.expect("clean exit");
        hub.close().await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(hub.run().await, Err(Error::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_then_eof_dispatches_once() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("rec", [wm(WmEvent::Shutdown)], &log))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, r#"["shutdown"]"#).await;
        peer.send_event(WmEvent::Shutdown, r#"{"change":"restart"}"#).await;
        drop(peer);

        finish(run).await.expect("clean exit");
        let (_, event, payload) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Shutdown));
        assert_eq!(payload, json!({"change": "restart"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_init_payload_carries_config_section() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("a", [lifecycle(HubEvent::Init)], &log))
                .extension(recorder("b", [lifecycle(HubEvent::Init)], &log))
                .section("a", json!({"layouts": ["us", "de"]}))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;

        let (name, _, payload) = next_entry(&mut rx).await;
        assert_eq!(name, "a");
        assert_eq!(
            payload,
            json!({"running_as_status": false, "config": {"layouts": ["us", "de"]}})
        );
        let (name, _, payload) = next_entry(&mut rx).await;
        assert_eq!(name, "b");
        assert_eq!(payload, json!({"running_as_status": false, "config": {}}));

        hub.handle().close().unwrap();
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_second_run_while_running() {
        let (conn, mut peer) = MockPeer::pair();
        let hub = Arc::new(Hub::builder().build(conn).unwrap());
        let run = spawn_run(&hub);

        peer.expect_request(MessageType::Subscribe, "[]").await;
        assert!(matches!(hub.run().await, Err(Error::AlreadyRunning)));

        peer.reply(MessageType::Subscribe, r#"{"success":true}"#).await;
        hub.close().await;
        finish(run).await.expect("clean exit");
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test]
    async fn test_close_before_run() {
        let (conn, _peer) = MockPeer::pair();
        let hub = Hub::builder().build(conn).unwrap();
        let handle = hub.handle();

        hub.close().await;
        assert_eq!(hub.state(), HubState::Closed);
        assert!(matches!(handle.command("nop").await, Err(Error::ShuttingDown)));
        assert!(matches!(hub.run().await, Err(Error::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_protocol_violation_ends_run_with_error() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("rec", [lifecycle(HubEvent::Shutdown)], &log))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, r#"["shutdown"]"#).await;
        peer.send_raw(b"not-i3-ipc-magic").await;

        let result = finish(run).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
        let (_, _, payload) = next_entry(&mut rx).await;
        assert_eq!(payload, json!("error"));
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("rec", [wm(WmEvent::Tick)], &log))
                .build(conn)
                .unwrap(),
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, r#"["tick"]"#).await;
        peer.send_event(WmEvent::Tick, "{broken").await;
        peer.send_event(WmEvent::Tick, r#"{"payload":"ok"}"#).await;

        let (_, _, payload) = next_entry(&mut rx).await;
        assert_eq!(payload, json!({"payload": "ok"}));

        hub.close().await;
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (conn, mut peer) = MockPeer::pair();
        let hub = Arc::new(Hub::builder().build(conn).unwrap());
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        handle.close().unwrap();
        finish(run).await.expect("clean exit");

        assert!(handle.is_shutting_down());
        assert!(matches!(handle.get_version().await, Err(Error::ShuttingDown)));
        assert!(matches!(handle.refresh_status(), Err(Error::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_emit_event_is_serial_and_reports_failure() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let fired = EventName::extension("source::fired").unwrap();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("first", [fired.clone()], &log))
                .extension(failing("second", [fired.clone()], &log))
                .extension(recorder("third", [fired.clone()], &log))
                .build(conn)
                .unwrap(),
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);
        acknowledge(&mut peer, "[]").await;

        let result = handle.emit_event("source::fired", json!(["x"])).await;
        assert!(matches!(result, Err(Error::Handler { ref extension, .. }) if extension == "second"));

        let names: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|(name, event, _)| {
                assert_eq!(event, fired);
                name
            })
            .collect();
        assert_eq!(names, ["first", "second"]);

        handle.close().unwrap();
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_status_header_and_lines() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, _rx) = mpsc::unbounded_channel();
        let (hub, mut bar) = status_hub(
            Hub::builder().extension(recorder("cpu", [lifecycle(HubEvent::Refresh)], &log)),
            conn,
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        assert_eq!(
            bar.line().await,
            r#"{"version":1,"stop_signal":40,"cont_signal":39,"click_events":true}"#
        );
        assert_eq!(bar.line().await, "[");

        handle.refresh_status().unwrap();
        assert_eq!(bar.line().await, r#"[{"name":"cpu","markup":"none","full_text":"1"}]"#);
        handle.refresh_status().unwrap();
        assert_eq!(bar.line().await, r#",[{"name":"cpu","markup":"none","full_text":"2"}]"#);

        hub.close().await;
        finish(run).await.expect("clean exit");
        assert!(bar.lines.next_line().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_still_emits_partial_line() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, _rx) = mpsc::unbounded_channel();
        let refresh = lifecycle(HubEvent::Refresh);
        let (hub, mut bar) = status_hub(
            Hub::builder()
                .extension(recorder("a", [refresh.clone()], &log))
                .extension(failing("b", [refresh.clone()], &log))
                .extension(recorder("c", [refresh], &log)),
            conn,
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        bar.line().await;
        bar.line().await;

        handle.refresh_status().unwrap();
        assert_eq!(bar.line().await, r#"[{"name":"a","markup":"none","full_text":"1"}]"#);

        handle.close().unwrap();
        finish(run).await.expect("clean exit");
    }

    /// Merges a fixed item on every refresh.
    struct Block {
        name: &'static str,
        item: Value,
    }

    #[async_trait]
    impl Extension for Block {
        fn name(&self) -> &str {
            self.name
        }

        fn register(&self, registrar: &mut Registrar) -> Result<()> {
            registrar.listen(HubEvent::Refresh);
            Ok(())
        }

        async fn on_refresh(&self, _hub: &HubHandle, status: &mut StatusArray) -> Result<()> {
            status.merge(serde_json::from_value(self.item.clone())?);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_two_extensions_share_one_item() {
        let (conn, mut peer) = MockPeer::pair();
        let (hub, mut bar) = status_hub(
            Hub::builder()
                .extension(Arc::new(Block {
                    name: "cpu_text",
                    item: json!({"name": "cpu", "full_text": "5%"}),
                }))
                .extension(Arc::new(Block {
                    name: "cpu_color",
                    item: json!({"name": "cpu", "full_text": "5%", "color": "red"}),
                })),
            conn,
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        bar.line().await;
        bar.line().await;

        handle.refresh_status().unwrap();
        assert_eq!(
            bar.line().await,
            r#"[{"name":"cpu","markup":"none","full_text":"5%","color":"red"}]"#
        );

        handle.close().unwrap();
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_suspended_output_is_deferred_until_resume() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let (hub, mut bar) = status_hub(
            Hub::builder().extension(recorder(
                "n",
                [
                    lifecycle(HubEvent::Refresh),
                    lifecycle(HubEvent::Suspend),
                    lifecycle(HubEvent::Resume),
                ],
                &log,
            )),
            conn,
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        bar.line().await;
        bar.line().await;

        handle.suspend().unwrap();
        handle.refresh_status().unwrap();
        handle.refresh_status().unwrap();
        handle.resume().unwrap();
        handle.refresh_status().unwrap();

        assert_eq!(bar.line().await, r#"[{"name":"n","markup":"none","full_text":"2"}]"#);
        assert_eq!(bar.line().await, r#",[{"name":"n","markup":"none","full_text":"3"}]"#);

        let (_, event, _) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Suspend));
        let (_, event, _) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Resume));

        handle.close().unwrap();
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_click_events_are_dispatched() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, mut rx) = mpsc::unbounded_channel();
        let (hub, mut bar) = status_hub(
            Hub::builder().extension(recorder("kb", [lifecycle(HubEvent::Click)], &log)),
            conn,
        );
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        bar.clicks
            .write_all(b"[\n{\"name\":\"kb\",\"button\":1}\n,{\"name\":\"kb\",\"button\":3}\n")
            .await
            .unwrap();

        let (_, event, first) = next_entry(&mut rx).await;
        assert_eq!(event, lifecycle(HubEvent::Click));
        let (_, _, second) = next_entry(&mut rx).await;
        let mut buttons = vec![first["button"].clone(), second["button"].clone()];
        buttons.sort_by_key(|b| b.as_u64());
        assert_eq!(buttons, [json!(1), json!(3)]);

        hub.close().await;
        finish(run).await.expect("clean exit");
    }

    #[tokio::test]
    async fn test_refresh_ignored_without_status_output() {
        let (conn, mut peer) = MockPeer::pair();
        let (log, _rx) = mpsc::unbounded_channel();
        let hub = Arc::new(
            Hub::builder()
                .extension(recorder("cpu", [lifecycle(HubEvent::Refresh)], &log))
                .build(conn)
                .unwrap(),
        );
        let handle = hub.handle();
        let run = spawn_run(&hub);

        acknowledge(&mut peer, "[]").await;
        handle.refresh_status().unwrap();
        handle.close().unwrap();

        finish(run).await.expect("clean exit");
        assert!(!hub.running_as_status());
    }
}
