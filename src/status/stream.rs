//! Status line streaming protocol.
//!
//! # Output
//!
//! ```text
//! {"version":1,"stop_signal":64,"cont_signal":63,"click_events":true}
//! [
//! [{"name":"kb","markup":"none","full_text":"us"}]
//! ,[{"name":"kb","markup":"none","full_text":"de"}]
//! ```
//!
//! The outer array is opened once and never closed; the bar consumes it as
//! an endless stream.
//!
//! # Input
//!
//! ```text
//! [
//! {"name":"kb","button":1,"x":1830,"y":12}
//! ,{"name":"kb","button":3,"x":1832,"y":10}
//! ```

// ============================================================================
// Imports
// ============================================================================

use futures_util::stream::{self, BoxStream};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::StatusArray;

// ============================================================================
// Constants
// ============================================================================

/// Status protocol version announced in the header.
pub const PROTOCOL_VERSION: u32 = 1;

// ============================================================================
// StatusHeader
// ============================================================================

/// Handshake line opening the status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusHeader {
    /// Protocol version.
    pub version: u32,
    /// Signal the bar sends to pause output.
    pub stop_signal: i32,
    /// Signal the bar sends to resume output.
    pub cont_signal: i32,
    /// Whether click events should be written to our input.
    pub click_events: bool,
}

impl StatusHeader {
    /// Creates a header for the current protocol version.
    #[must_use]
    pub const fn new(stop_signal: i32, cont_signal: i32, click_events: bool) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            stop_signal,
            cont_signal,
            click_events,
        }
    }
}

// ============================================================================
// StatusWriter
// ============================================================================

/// Serializes status arrays onto the bar's input.
pub struct StatusWriter<W> {
    writer: W,
    header_written: bool,
    first_status: bool,
}

impl<W> StatusWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
            first_status: true,
        }
    }

    /// Writes the header line and opens the outer array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header was already written.
    pub async fn write_header(&mut self, header: &StatusHeader) -> Result<()> {
        if self.header_written {
            return Err(Error::protocol("status header written twice"));
        }

        let mut line = serde_json::to_vec(header)?;
        line.extend_from_slice(b"\n[\n");
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        self.header_written = true;

        debug!(?header, "Status header written");
        Ok(())
    }

    /// Writes one status array line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header has not been written yet,
    /// or [`Error::Io`] if the bar went away.
    pub async fn write_status(&mut self, status: &StatusArray) -> Result<()> {
        if !self.header_written {
            return Err(Error::protocol("status written before header"));
        }

        let mut line = Vec::with_capacity(128);
        if !self.first_status {
            line.push(b',');
        }
        serde_json::to_writer(&mut line, status)?;
        line.push(b'\n');

        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        self.first_status = false;

        trace!(items = status.len(), "Status written");
        Ok(())
    }

    /// Flushes and shuts the output down.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// Click Events
// ============================================================================

/// Reader state for [`click_events`].
struct ClickReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    opened: bool,
    first: bool,
}

/// Streams click events read from the bar.
///
/// Skips the opening `[`, strips the leading comma of every line after the
/// first, and drops (with a warning) lines that are not valid JSON. Invalid
/// UTF-8 is replaced rather than rejected. The stream ends with the input.
pub fn click_events<R>(reader: R) -> BoxStream<'static, Value>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let state = ClickReader {
        reader: BufReader::new(reader),
        buf: Vec::new(),
        opened: false,
        first: true,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        let event = state.next_event().await?;
        Some((event, state))
    }))
}

impl<R> ClickReader<R>
where
    R: AsyncRead + Unpin,
{
    async fn next_line(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => {
                debug!("Reached end of click event input");
                None
            }
            Ok(_) => Some(String::from_utf8_lossy(&self.buf).into_owned()),
            Err(e) => {
                warn!(error = %e, "Failed to read click events");
                None
            }
        }
    }

    async fn next_event(&mut self) -> Option<Value> {
        if !self.opened {
            let opening = self.next_line().await?;
            if opening.trim() != "[" {
                warn!(line = %opening, "Unexpected opening line of click events");
            }
            self.opened = true;
        }

        loop {
            let line = self.next_line().await?;
            let mut text = line.trim();
            if text.is_empty() {
                continue;
            }

            if self.first {
                self.first = false;
            } else if let Some(rest) = text.strip_prefix(',') {
                text = rest;
            }

            match serde_json::from_str(text) {
                Ok(event) => return Some(event),
                Err(e) => {
                    warn!(line = %line, error = %e, "Failed to parse click event");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
