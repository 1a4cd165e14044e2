//! Codec for the two window-mirror wire records.
//!
//! Inbound frame (streamer → viewer):
//! ```text
//! [metadata_len:4 LE u32][metadata:"<window_id>|<data_type>|<payload_len>"][payload:payload_len]
//! ```
//!
//! Outbound UI event (viewer → streamer):
//! ```text
//! [20:4 LE u32][event_type:4][value:4][x:4][y:4][window_id:4]   (all LE i32)
//! ```
//!
//! Every multi-byte integer is little-endian on the wire regardless of the
//! host byte order; `to_le_bytes`/`from_le_bytes` take care of the swap on
//! big-endian hosts.
//!
//! The frame decoders read from any [`std::io::Read`] so the same code runs
//! against a `TcpStream` in production and a `Cursor` in tests.

use std::io::Read;

use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{
    FrameHeader, UiEvent, UiEventType, EVENT_MESSAGE_SIZE, EVENT_RECORD_SIZE, FIELD_SEPARATOR,
    LENGTH_PREFIX_SIZE,
};

/// Upper bound on the buffer reserved before any payload byte has arrived.
///
/// The declared length comes from the peer, so the buffer grows with the data
/// actually received beyond this point.
const PAYLOAD_PREALLOC_LIMIT: usize = 1 << 20;

/// Errors produced while encoding or decoding wire records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame header was truncated, not UTF-8, did not have exactly three
    /// fields, or declared an unparsable payload length.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// The stream ended before the declared payload was complete.
    #[error("connection closed after {received} of {expected} payload bytes")]
    ConnectionClosed { expected: usize, received: usize },

    /// An event message had the wrong size or an unknown event type.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A value cannot be represented on the wire.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Frame decoding ────────────────────────────────────────────────────────────

/// Reads one frame header from `reader`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedHeader`] for every failure: a short or
/// failed read of the length prefix or the metadata, invalid UTF-8, a field
/// count other than three, or a payload length that is not a non-negative
/// base-10 integer fitting in 32 bits.
pub fn decode_header<R: Read>(reader: &mut R) -> Result<FrameHeader, ProtocolError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut prefix)
        .map_err(|e| ProtocolError::MalformedHeader(format!("length prefix: {e}")))?;
    let metadata_len = u32::from_le_bytes(prefix) as usize;

    let mut metadata = Vec::new();
    reader
        .by_ref()
        .take(metadata_len as u64)
        .read_to_end(&mut metadata)
        .map_err(|e| ProtocolError::MalformedHeader(format!("metadata: {e}")))?;
    if metadata.len() != metadata_len {
        return Err(ProtocolError::MalformedHeader(format!(
            "expected {metadata_len} metadata bytes, got {}",
            metadata.len()
        )));
    }

    let text = std::str::from_utf8(&metadata)
        .map_err(|e| ProtocolError::MalformedHeader(format!("invalid UTF-8: {e}")))?;
    let header = parse_header(text)?;
    trace!(
        "frame header: window={} type={} len={}",
        header.window_id,
        header.data_type,
        header.payload_length
    );
    Ok(header)
}

/// Parses the textual form `"<window_id>|<data_type>|<payload_len>"`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedHeader`] if the text does not split into
/// exactly three fields or the third is not a valid `u32`.
pub fn parse_header(text: &str) -> Result<FrameHeader, ProtocolError> {
    let parts: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    let [window_id, data_type, length] = parts.as_slice() else {
        return Err(ProtocolError::MalformedHeader(format!(
            "expected 3 fields, got {} in {text:?}",
            parts.len()
        )));
    };
    let payload_length = length.parse::<u32>().map_err(|e| {
        ProtocolError::MalformedHeader(format!("payload length {length:?}: {e}"))
    })?;
    Ok(FrameHeader {
        window_id: (*window_id).to_string(),
        data_type: (*data_type).to_string(),
        payload_length,
    })
}

/// Reads exactly `length` payload bytes, looping over short reads.
///
/// # Errors
///
/// Returns [`ProtocolError::ConnectionClosed`] if the stream reaches
/// end-of-data first, or [`ProtocolError::Io`] if a read fails outright.
pub fn decode_payload<R: Read>(reader: &mut R, length: u32) -> Result<Vec<u8>, ProtocolError> {
    let expected = length as usize;
    let mut payload = Vec::with_capacity(expected.min(PAYLOAD_PREALLOC_LIMIT));
    reader
        .by_ref()
        .take(u64::from(length))
        .read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(ProtocolError::ConnectionClosed {
            expected,
            received: payload.len(),
        });
    }
    Ok(payload)
}

// ── Frame encoding ────────────────────────────────────────────────────────────

/// Encodes one inbound frame exactly as a streamer puts it on the wire.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidField`] if `window_id` or `data_type`
/// contains the field separator, or if a length does not fit in a `u32`.
pub fn encode_frame(
    window_id: &str,
    data_type: &str,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    for (name, value) in [("window id", window_id), ("data type", data_type)] {
        if value.contains(FIELD_SEPARATOR) {
            return Err(ProtocolError::InvalidField(format!(
                "{name} {value:?} contains '{FIELD_SEPARATOR}'"
            )));
        }
    }
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::InvalidField(format!("payload of {} bytes exceeds u32", payload.len()))
    })?;

    let metadata = format!("{window_id}{FIELD_SEPARATOR}{data_type}{FIELD_SEPARATOR}{payload_len}");
    let metadata_len = u32::try_from(metadata.len())
        .map_err(|_| ProtocolError::InvalidField("metadata exceeds u32".to_string()))?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + metadata.len() + payload.len());
    buf.extend_from_slice(&metadata_len.to_le_bytes());
    buf.extend_from_slice(metadata.as_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

// ── Event encoding / decoding ─────────────────────────────────────────────────

/// Encodes a [`UiEvent`] as its 24-byte wire message.
///
/// The output is always the length prefix `20` followed by the five fields,
/// whatever the field values are.
///
/// # Examples
///
/// ```rust
/// use mirror_core::protocol::{encode_event, decode_event};
/// use mirror_core::protocol::messages::{UiEvent, UiEventType};
///
/// let event = UiEvent::new(UiEventType::Scroll, -2, 10, 20, 7);
/// let bytes = encode_event(&event);
/// let (decoded, consumed) = decode_event(&bytes).unwrap();
/// assert_eq!(decoded, event);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_event(event: &UiEvent) -> [u8; EVENT_MESSAGE_SIZE] {
    let mut buf = [0u8; EVENT_MESSAGE_SIZE];
    buf[..LENGTH_PREFIX_SIZE].copy_from_slice(&(EVENT_RECORD_SIZE as u32).to_le_bytes());
    for (i, field) in event.fields().iter().enumerate() {
        let off = LENGTH_PREFIX_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&field.to_le_bytes());
    }
    buf
}

/// Decodes one length-prefixed event message from the start of `bytes`.
///
/// Returns the event and the number of bytes consumed so callers can walk a
/// buffer holding several messages.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedEvent`] if fewer than 24 bytes are
/// available, the prefix is not 20, or the event type is unknown.
pub fn decode_event(bytes: &[u8]) -> Result<(UiEvent, usize), ProtocolError> {
    if bytes.len() < EVENT_MESSAGE_SIZE {
        return Err(ProtocolError::MalformedEvent(format!(
            "need {EVENT_MESSAGE_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    let declared = read_u32_le(bytes, 0) as usize;
    if declared != EVENT_RECORD_SIZE {
        return Err(ProtocolError::MalformedEvent(format!(
            "length prefix {declared}, expected {EVENT_RECORD_SIZE}"
        )));
    }
    let event = decode_event_record(&bytes[LENGTH_PREFIX_SIZE..EVENT_MESSAGE_SIZE])?;
    Ok((event, EVENT_MESSAGE_SIZE))
}

/// Decodes the 20-byte body of an event message (no length prefix).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedEvent`] if `record` is not exactly
/// 20 bytes or the event type code is unknown.
pub fn decode_event_record(record: &[u8]) -> Result<UiEvent, ProtocolError> {
    if record.len() != EVENT_RECORD_SIZE {
        return Err(ProtocolError::MalformedEvent(format!(
            "record is {} bytes, expected {EVENT_RECORD_SIZE}",
            record.len()
        )));
    }
    let code = read_i32_le(record, 0);
    let event_type = UiEventType::try_from(code)
        .map_err(|_| ProtocolError::MalformedEvent(format!("unknown event type: {code}")))?;
    Ok(UiEvent {
        event_type,
        value: read_i32_le(record, 4),
        x: read_i32_le(record, 8),
        y: read_i32_le(record, 12),
        window_id: read_i32_le(record, 16),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_i32_le(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
