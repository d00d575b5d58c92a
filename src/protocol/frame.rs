//! Binary frame codec.
//!
//! Every message on the control socket is a fixed 14-byte header followed by
//! a UTF-8 JSON body.
//!
//! # Format
//!
//! ```text
//! ┌──────────────┬───────────────┬───────────────┬────────────────┐
//! │ magic (6)    │ body len (4)  │ type tag (4)  │ body (len)     │
//! │ "i3-ipc"     │ native endian │ native endian │ UTF-8 JSON     │
//! └──────────────┴───────────────┴───────────────┴────────────────┘
//! ```
//!
//! Bit 31 of the type tag marks an event; the low 31 bits are the index into
//! the message or event catalog.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Magic string opening every frame.
pub const MAGIC: &[u8; 6] = b"i3-ipc";

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = MAGIC.len() + 4 + 4;

/// Type tag bit marking a frame as an event.
pub const EVENT_FLAG: u32 = 0x8000_0000;

/// Largest body accepted from the peer (64 MiB).
pub const MAX_BODY_LEN: u32 = 64 * 1024 * 1024;

/// Mask selecting the catalog index from a type tag.
const TYPE_MASK: u32 = !EVENT_FLAG;

// ============================================================================
// FrameHeader
// ============================================================================

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the body following the header.
    pub body_len: u32,
    /// Catalog index (event flag stripped).
    pub type_index: u32,
    /// Whether the frame carries an event.
    pub is_event: bool,
}

impl FrameHeader {
    /// Decodes a header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the magic does not match.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::protocol(format!("bad magic {magic:?}")));
        }

        let body_len = u32::from_ne_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let tag = u32::from_ne_bytes([rest[4], rest[5], rest[6], rest[7]]);

        Ok(Self {
            body_len,
            type_index: tag & TYPE_MASK,
            is_event: tag & EVENT_FLAG != 0,
        })
    }

    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut tag = self.type_index & TYPE_MASK;
        if self.is_event {
            tag |= EVENT_FLAG;
        }

        let mut out = [0u8; HEADER_LEN];
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        out[6..10].copy_from_slice(&self.body_len.to_ne_bytes());
        out[10..14].copy_from_slice(&tag.to_ne_bytes());
        out
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a complete frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the body does not fit the length field.
pub fn encode(type_index: u32, is_event: bool, body: &[u8]) -> Result<Vec<u8>> {
    let body_len = u32::try_from(body.len())
        .map_err(|_| Error::protocol(format!("body of {} bytes too large", body.len())))?;

    let header = FrameHeader {
        body_len,
        type_index,
        is_event,
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(body);
    Ok(frame)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a frame body as JSON.
///
/// # Errors
///
/// Returns [`Error::BodyDecode`] on malformed UTF-8 or JSON.
pub fn decode_body(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::body_decode(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| Error::body_decode(e.to_string()))
}

/// Reads exactly one frame from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. when zero bytes arrive
/// where a header was expected.
///
/// # Errors
///
/// - [`Error::Protocol`] on bad magic, a body over [`MAX_BODY_LEN`] or a
///   stream ending mid-frame
/// - [`Error::Io`] on read failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(FrameHeader, Vec<u8>)>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        let n = reader.read(&mut raw[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::protocol(format!(
                "truncated header ({filled} of {HEADER_LEN} bytes)"
            )));
        }
        filled += n;
    }

    let header = FrameHeader::decode(&raw)?;
    if header.body_len > MAX_BODY_LEN {
        return Err(Error::protocol(format!(
            "frame body of {} bytes exceeds the {MAX_BODY_LEN} byte limit",
            header.body_len
        )));
    }

    let mut body = vec![0u8; header.body_len as usize];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::protocol(format!("truncated body (expected {} bytes)", header.body_len))
        } else {
            Error::Io(e)
        }
    })?;

    Ok(Some((header, body)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_layout() {
        let frame = encode(2, false, br#"["window"]"#).expect("encode");

        assert_eq!(&frame[..6], b"i3-ipc");
        assert_eq!(&frame[6..10], &10u32.to_ne_bytes());
        assert_eq!(&frame[10..14], &2u32.to_ne_bytes());
        assert_eq!(&frame[14..], br#"["window"]"#);
    }

    #[test]
    fn test_event_flag_in_bit_31() {
        let frame = encode(3, true, b"{}").expect("encode");
        assert_eq!(&frame[10..14], &0x8000_0003u32.to_ne_bytes());

        let header = FrameHeader::decode(frame[..HEADER_LEN].try_into().unwrap()).expect("decode");
        assert_eq!(header.type_index, 3);
        assert!(header.is_event);
    }

    #[test]
    fn test_bad_magic() {
        let mut frame = encode(0, false, b"{}").expect("encode");
        frame[0] = b'x';

        let result = FrameHeader::decode(frame[..HEADER_LEN].try_into().unwrap());
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_decode_body_errors() {
        assert!(matches!(
            decode_body(b"{not json"),
            Err(Error::BodyDecode { .. })
        ));
        assert!(matches!(
            decode_body(&[0xff, 0xfe]),
            Err(Error::BodyDecode { .. })
        ));
        assert_eq!(decode_body(b"[1]").expect("decode"), json!([1]));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header() {
        let mut partial: &[u8] = b"i3-ipc\x01";
        let result = read_frame(&mut partial).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let frame = encode(1, false, b"[1,2,3]").expect("encode");
        let mut cut: &[u8] = &frame[..frame.len() - 2];
        let result = read_frame(&mut cut).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_read_frame_oversized_body() {
        let header = FrameHeader {
            body_len: u32::MAX,
            type_index: 4,
            is_event: false,
        };
        let raw = header.encode();
        let mut reader: &[u8] = &raw;
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_read_frame_sequence() {
        let mut stream = encode(7, false, b"{}").expect("encode");
        stream.extend(encode(6, true, b"[1,2]").expect("encode"));
        let mut reader: &[u8] = &stream;

        let (first, body) = read_frame(&mut reader).await.expect("read").expect("frame");
        assert_eq!(first.type_index, 7);
        assert!(!first.is_event);
        assert_eq!(body, b"{}");

        let (second, body) = read_frame(&mut reader).await.expect("read").expect("frame");
        assert_eq!(second.type_index, 6);
        assert!(second.is_event);
        assert_eq!(decode_body(&body).expect("json"), json!([1, 2]));

        assert!(read_frame(&mut reader).await.expect("read").is_none());
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_frame_round_trip(
            type_index in 0u32..=0x7fff_ffff,
            is_event in any::<bool>(),
            payload in json_value(),
        ) {
            let body = serde_json::to_vec(&payload).unwrap();
            let frame = encode(type_index, is_event, &body).unwrap();

            let header = FrameHeader::decode(frame[..HEADER_LEN].try_into().unwrap()).unwrap();
            prop_assert_eq!(header.type_index, type_index);
            prop_assert_eq!(header.is_event, is_event);
            prop_assert_eq!(header.body_len as usize, body.len());
            prop_assert_eq!(decode_body(&frame[HEADER_LEN..]).unwrap(), payload);
        }
    }
}
