//! Scripted window manager peer for tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::protocol::frame::{self, HEADER_LEN};
use crate::protocol::{MessageType, WmEvent};

use super::Connection;

/// Encodes a reply or request frame.
pub(crate) fn message_frame(index: u32, body: &str) -> Vec<u8> {
    frame::encode(index, false, body.as_bytes()).expect("encode")
}

/// Encodes an event frame.
pub(crate) fn event_frame(event: WmEvent, body: &str) -> Vec<u8> {
    frame::encode(event.index(), true, body.as_bytes()).expect("encode")
}

/// The far end of a [`Connection`] under test.
pub(crate) struct MockPeer {
    stream: UnixStream,
}

impl MockPeer {
    /// Creates a connected `(Connection, MockPeer)` pair.
    pub(crate) fn pair() -> (Connection, Self) {
        let (local, remote) = UnixStream::pair().expect("socket pair");
        (Connection::from_stream(local), Self { stream: remote })
    }

    /// Reads one request, returning its type index and body.
    pub(crate) async fn read_request(&mut self) -> (u32, String) {
        let mut raw = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut raw).await.expect("header");
        let header = frame::FrameHeader::decode(&raw).expect("magic");
        assert!(!header.is_event, "client sent an event frame");

        let mut body = vec![0u8; header.body_len as usize];
        self.stream.read_exact(&mut body).await.expect("body");
        (header.type_index, String::from_utf8(body).expect("utf-8"))
    }

    /// Reads one request and asserts its type and body.
    pub(crate) async fn expect_request(&mut self, message: MessageType, payload: &str) {
        let (index, body) = self.read_request().await;
        assert_eq!(index, message.index(), "unexpected message type");
        assert_eq!(body, payload, "unexpected payload for {message}");
    }

    /// Sends a reply frame.
    pub(crate) async fn reply(&mut self, message: MessageType, body: &str) {
        self.send_raw(&message_frame(message.index(), body)).await;
    }

    /// Sends an event frame.
    pub(crate) async fn send_event(&mut self, event: WmEvent, body: &str) {
        self.send_raw(&event_frame(event, body)).await;
    }

    /// Sends arbitrary bytes.
    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }
}
