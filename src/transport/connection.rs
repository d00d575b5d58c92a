//! Control socket connection and read loop.
//!
//! This module handles the connection to the window manager, including
//! single-flight request/reply correlation and event queueing.
//!
//! # Read Loop
//!
//! The connection spawns a tokio task that owns the read half of the socket
//! and is the only reader of it:
//!
//! - Reply frames resolve the single outstanding reply slot
//! - Event frames are appended to the event queue
//! - End of stream appends a synthetic [`IncomingEvent::Eof`]
//! - Protocol violations fail the reply slot and end the queue
//!
//! # Request Ordering
//!
//! Only one request is on the wire at a time. The write half sits behind a
//! FIFO-fair async mutex held from the moment a request is written until its
//! reply arrives, so concurrent callers are served strictly in the order they
//! asked. A caller that gives up after writing leaves its reply owed; the
//! next caller writes only once the read loop has drained that reply.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::frame;
use crate::protocol::{IncomingEvent, MessageType, WmEvent};

// ============================================================================
// Types
// ============================================================================

/// Read half of the socket, owned by the read loop.
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of the socket, guarded by the send slot.
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Queue entries handed to [`Connection::next_event`].
type EventSender = mpsc::UnboundedSender<Result<IncomingEvent>>;
type EventReceiver = mpsc::UnboundedReceiver<Result<IncomingEvent>>;

// ============================================================================
// ReplySlot
// ============================================================================

/// The single outstanding request awaiting its reply.
#[derive(Default)]
struct ReplySlot {
    /// Channel of the request currently on the wire.
    pending: Option<oneshot::Sender<Result<Value>>>,
    /// Replies still owed to callers that gave up waiting.
    discard: usize,
    /// The read side is gone; no further reply will arrive.
    read_closed: bool,
}

impl ReplySlot {
    /// Marks the read side closed and fails the outstanding request.
    fn close(&mut self, error: Error) {
        self.read_closed = true;
        if let Some(tx) = self.pending.take() {
            let _ = tx.send(Err(error));
        }
    }
}

/// Clears the reply slot if a caller is dropped mid-request.
struct InFlight<'a> {
    slot: &'a Mutex<ReplySlot>,
    written: bool,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut slot = self.slot.lock();
        if slot.pending.take().is_some() && self.written {
            slot.discard += 1;
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Connection to the window manager's control socket.
///
/// Cheap to clone; all clones share the socket, the reply slot and the
/// event queue.
///
/// # Example
///
/// ```no_run
/// use i3hub::transport::Connection;
///
/// # async fn example() -> i3hub::Result<()> {
/// let conn = Connection::connect("/run/user/1000/i3/ipc-socket.1234").await?;
/// let workspaces = conn.get_workspaces().await?;
/// println!("{workspaces}");
/// conn.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    /// Send slot; waiters queue on this lock in FIFO order.
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    /// Reply slot (shared with the read loop).
    reply: Arc<Mutex<ReplySlot>>,
    /// Signalled when owed replies are drained or the read side closes.
    drained: Arc<Notify>,
    /// Event queue consumer.
    events: tokio::sync::Mutex<EventReceiver>,
    /// Read loop task.
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Set by [`Connection::close`].
    closed: AtomicBool,
}

impl Connection {
    /// Connects to the control socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the socket cannot be opened.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| Error::connection(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "Connected to control socket");
        Ok(Self::from_stream(stream))
    }

    /// Creates a connection over an already open stream.
    ///
    /// Spawns the read loop task internally, so this must be called from
    /// within a tokio runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reply = Arc::new(Mutex::new(ReplySlot::default()));
        let drained = Arc::new(Notify::new());

        let reader = tokio::spawn(Self::run_read_loop(
            Box::new(read_half),
            events_tx,
            Arc::clone(&reply),
            Arc::clone(&drained),
        ));

        Self {
            inner: Arc::new(Inner {
                writer: tokio::sync::Mutex::new(Some(Box::new(write_half))),
                reply,
                drained,
                events: tokio::sync::Mutex::new(events_rx),
                reader: Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Sends a request and waits for its reply.
    ///
    /// Waits for any request already on the wire to be answered first;
    /// concurrent callers are served in submission order.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::Io`] if writing the request fails
    /// - [`Error::BodyDecode`] if the reply body is malformed
    /// - [`Error::Protocol`] if the read loop hits a protocol violation
    pub async fn call(&self, message: MessageType, payload: &str) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let frame = frame::encode(message.index(), false, payload.as_bytes())?;

        let mut writer = self.inner.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        let response_rx = loop {
            let drained = self.inner.drained.notified();
            {
                let mut slot = self.inner.reply.lock();
                if slot.read_closed {
                    return Err(Error::ConnectionClosed);
                }
                if slot.discard == 0 {
                    let (tx, rx) = oneshot::channel();
                    slot.pending = Some(tx);
                    break rx;
                }
                trace!(owed = slot.discard, "Waiting for replies of abandoned requests");
            }
            drained.await;
        };

        let mut in_flight = InFlight {
            slot: &self.inner.reply,
            written: false,
            done: false,
        };

        if let Err(e) = Self::write_frame(stream, &frame).await {
            warn!(%message, error = %e, "Failed to send request");
            return Err(e);
        }
        in_flight.written = true;
        trace!(%message, bytes = frame.len(), "Request sent");

        let result = match response_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        };
        in_flight.done = true;

        result
    }

    /// Waits for the next event.
    ///
    /// Events are returned in arrival order. A malformed event body yields
    /// [`Error::BodyDecode`] for that event only.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] once the queue is drained after end of
    ///   stream or [`close`](Self::close)
    /// - [`Error::Protocol`] / [`Error::Io`] when the read loop failed
    pub async fn next_event(&self) -> Result<IncomingEvent> {
        let mut events = self.inner.events.lock().await;
        match events.recv().await {
            Some(event) => event,
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Closes the connection.
    ///
    /// Stops the read loop, fails every waiting caller with
    /// [`Error::ConnectionClosed`] and shuts the socket down. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(reader) = self.inner.reader.lock().take() {
            reader.abort();
        }
        self.inner.reply.lock().close(Error::ConnectionClosed);
        self.inner.drained.notify_waiters();

        let mut writer = self.inner.writer.lock().await;
        if let Some(mut stream) = writer.take() {
            let _ = stream.shutdown().await;
        }

        debug!("Connection closed");
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn write_frame(stream: &mut BoxedWriter, frame: &[u8]) -> Result<()> {
        stream.write_all(frame).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read loop: the only reader of the socket.
    async fn run_read_loop(
        mut reader: BoxedReader,
        events_tx: EventSender,
        reply: Arc<Mutex<ReplySlot>>,
        drained: Arc<Notify>,
    ) {
        loop {
            let (header, body) = match frame::read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,

                Ok(None) => {
                    debug!("Control socket reached end of stream");
                    reply.lock().close(Error::ConnectionClosed);
                    let _ = events_tx.send(Ok(IncomingEvent::Eof));
                    break;
                }

                Err(e) => {
                    error!(error = %e, "Control socket read failed");
                    reply.lock().close(Error::protocol(e.to_string()));
                    let _ = events_tx.send(Err(e));
                    break;
                }
            };

            if header.is_event {
                let Some(event) = WmEvent::from_index(header.type_index) else {
                    warn!(index = header.type_index, "Dropping event of unknown type");
                    continue;
                };
                let entry = frame::decode_body(&body).map(|payload| {
                    trace!(%event, "Event received");
                    IncomingEvent::Wm { event, payload }
                });
                let _ = events_tx.send(entry);
                continue;
            }

            let pending = {
                let mut slot = reply.lock();
                if slot.discard > 0 {
                    slot.discard -= 1;
                    trace!("Discarded reply of abandoned request");
                    if slot.discard == 0 {
                        drained.notify_waiters();
                    }
                    continue;
                }
                slot.pending.take()
            };

            match pending {
                Some(tx) => {
                    let _ = tx.send(frame::decode_body(&body));
                }
                None => {
                    let e = Error::protocol(format!(
                        "reply of type {} without a pending request",
                        header.type_index
                    ));
                    error!(error = %e, "Control socket protocol violation");
                    reply.lock().close(Error::protocol(e.to_string()));
                    let _ = events_tx.send(Err(e));
                    break;
                }
            }
        }

        drained.notify_waiters();
        debug!("Read loop terminated");
    }
}

// ============================================================================
// Connection - Message Catalog
// ============================================================================

impl Connection {
    /// Runs a command (`command`).
    pub async fn command(&self, command: &str) -> Result<Value> {
        self.call(MessageType::RunCommand, command).await
    }

    /// Lists workspaces (`get_workspaces`).
    pub async fn get_workspaces(&self) -> Result<Value> {
        self.call(MessageType::GetWorkspaces, "").await
    }

    /// Subscribes to upstream events (`subscribe`).
    ///
    /// The body is the compact JSON array of event names, in the order given.
    pub async fn subscribe(&self, events: &[WmEvent]) -> Result<Value> {
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        let payload = serde_json::to_string(&names)?;
        self.call(MessageType::Subscribe, &payload).await
    }

    /// Lists outputs (`get_outputs`).
    pub async fn get_outputs(&self) -> Result<Value> {
        self.call(MessageType::GetOutputs, "").await
    }

    /// Fetches the layout tree (`get_tree`).
    pub async fn get_tree(&self) -> Result<Value> {
        self.call(MessageType::GetTree, "").await
    }

    /// Lists marks (`get_marks`).
    pub async fn get_marks(&self) -> Result<Value> {
        self.call(MessageType::GetMarks, "").await
    }

    /// Fetches a bar configuration, or the list of bar ids when `name` is
    /// `None` (`get_bar_config`).
    pub async fn get_bar_config(&self, name: Option<&str>) -> Result<Value> {
        self.call(MessageType::GetBarConfig, name.unwrap_or_default())
            .await
    }

    /// Fetches the window manager version (`get_version`).
    pub async fn get_version(&self) -> Result<Value> {
        self.call(MessageType::GetVersion, "").await
    }

    /// Lists binding modes (`get_binding_modes`).
    pub async fn get_binding_modes(&self) -> Result<Value> {
        self.call(MessageType::GetBindingModes, "").await
    }

    /// Fetches the loaded configuration (`get_config`).
    pub async fn get_config(&self) -> Result<Value> {
        self.call(MessageType::GetConfig, "").await
    }

    /// Sends a tick event with an optional payload (`send_tick`).
    pub async fn send_tick(&self, payload: Option<&str>) -> Result<Value> {
        self.call(MessageType::SendTick, payload.unwrap_or_default())
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
