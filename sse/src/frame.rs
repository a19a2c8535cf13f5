//! Encoding of events into `text/event-stream` frames.
//!
//! A frame is laid out as
//!
//! ```text
//! id:<id>\n          (only when the id is non-empty)
//! event:<type>\n     (only when the event type is non-empty)
//! data[:<payload>]\n (the colon and payload only when the payload is non-empty)
//! \n
//! ```
//!
//! Embedded newlines are not escaped. A payload containing a blank line
//! produces a malformed frame.

use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

const ID_PREFIX: &[u8] = b"id:";
const EVENT_PREFIX: &[u8] = b"event:";
const DATA_FIELD: &[u8] = b"data";
const TERMINATOR: &[u8] = b"\n\n";

/// Trait for getting the SSE event type name of a structured event.
pub trait EventType {
    fn event_type(&self) -> &str;
}

/// An encoded event, ready to be written to any number of clients.
///
/// Cloning a frame only bumps a reference count; all clients share the same
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn frame_len(id: &str, event_type: &str, payload_len: usize) -> usize {
    let mut len = DATA_FIELD.len() + TERMINATOR.len();
    if !id.is_empty() {
        len += ID_PREFIX.len() + id.len() + 1;
    }
    if !event_type.is_empty() {
        len += EVENT_PREFIX.len() + event_type.len() + 1;
    }
    if payload_len > 0 {
        len += 1 + payload_len;
    }
    len
}

/// Encodes an event with a raw byte payload.
pub fn encode(id: &str, event_type: &str, payload: &[u8]) -> Frame {
    let mut buf = BytesMut::with_capacity(frame_len(id, event_type, payload.len()));

    if !id.is_empty() {
        buf.put_slice(ID_PREFIX);
        buf.put_slice(id.as_bytes());
        buf.put_u8(b'\n');
    }
    if !event_type.is_empty() {
        buf.put_slice(EVENT_PREFIX);
        buf.put_slice(event_type.as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_slice(DATA_FIELD);
    if !payload.is_empty() {
        buf.put_u8(b':');
        buf.put_slice(payload);
    }
    buf.put_slice(TERMINATOR);

    Frame(buf.freeze())
}

pub fn encode_str(id: &str, event_type: &str, payload: &str) -> Frame {
    encode(id, event_type, payload.as_bytes())
}

pub fn encode_int(id: &str, event_type: &str, payload: i64) -> Frame {
    encode(id, event_type, payload.to_string().as_bytes())
}

pub fn encode_uint(id: &str, event_type: &str, payload: u64) -> Frame {
    encode(id, event_type, payload.to_string().as_bytes())
}

/// Encodes `value` as JSON. Fails with an `Encoding` error if `value` cannot
/// be serialized.
pub fn encode_json<T>(id: &str, event_type: &str, value: &T) -> Result<Frame, Error>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    Ok(encode(id, event_type, &payload))
}

/// Encodes a comment line. Clients ignore comments, which makes them useful
/// for keeping idle connections open.
pub fn comment(text: &str) -> Frame {
    let mut buf = BytesMut::with_capacity(1 + text.len() + TERMINATOR.len());
    buf.put_u8(b':');
    buf.put_slice(text.as_bytes());
    buf.put_slice(TERMINATOR);
    Frame(buf.freeze())
}
