//! Extension wire protocol
//!
//! Binary framing for the out-of-process page extension:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ Message type │ Payload size │ Payload             │
//! │ (i32, native)│ (i32, native)│ (size bytes)        │
//! └──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! The payload schema depends only on the type: `HELO` carries a native
//! `i32` protocol version, `FOCUS` and `BLUR` carry a NUL-terminated UTF-8
//! string. The host sends `HELO` once; everything else flows from the
//! extension to the host.

pub mod link;

pub use link::{attach_extension, ExtensionLink};

use crate::error::ProtocolError;
use std::io::{self, Read, Write};

/// Version announced in the host's `HELO`
pub const PROTOCOL_VERSION: i32 = 1;

/// Header length in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted from a peer
pub const MAX_PAYLOAD_SIZE: i32 = 1024 * 1024;

/// Wire tag of each message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageType {
    Hello = 0,
    Focus = 1,
    Blur = 2,
}

impl MessageType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(MessageType::Hello),
            1 => Some(MessageType::Focus),
            2 => Some(MessageType::Blur),
            _ => None,
        }
    }
}

/// One extio message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtMessage {
    Hello(i32),
    Focus(String),
    Blur(String),
}

impl ExtMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ExtMessage::Hello(_) => MessageType::Hello,
            ExtMessage::Focus(_) => MessageType::Focus,
            ExtMessage::Blur(_) => MessageType::Blur,
        }
    }

    /// Encode the payload alone
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            ExtMessage::Hello(version) => version.to_ne_bytes().to_vec(),
            ExtMessage::Focus(text) | ExtMessage::Blur(text) => {
                let mut payload = Vec::with_capacity(text.len() + 1);
                payload.extend_from_slice(text.as_bytes());
                payload.push(0);
                payload
            }
        }
    }

    /// Decode a payload for `kind`
    pub fn decode_payload(kind: MessageType, payload: &[u8]) -> Result<Self, ProtocolError> {
        match kind {
            MessageType::Hello => {
                let bytes: [u8; 4] = payload.try_into().map_err(|_| {
                    ProtocolError::Malformed(format!(
                        "HELO payload is {} bytes, expected 4",
                        payload.len()
                    ))
                })?;
                Ok(ExtMessage::Hello(i32::from_ne_bytes(bytes)))
            }
            MessageType::Focus => Ok(ExtMessage::Focus(decode_string(payload)?)),
            MessageType::Blur => Ok(ExtMessage::Blur(decode_string(payload)?)),
        }
    }
}

fn decode_string(payload: &[u8]) -> Result<String, ProtocolError> {
    let text = payload
        .strip_suffix(&[0])
        .ok_or_else(|| ProtocolError::Malformed("string payload is not NUL-terminated".into()))?;
    if text.contains(&0) {
        return Err(ProtocolError::Malformed("embedded NUL in string payload".into()));
    }
    String::from_utf8(text.to_vec())
        .map_err(|e| ProtocolError::Malformed(format!("string payload is not UTF-8: {}", e)))
}

fn encode_header(kind: MessageType, size: usize) -> io::Result<[u8; HEADER_SIZE]> {
    let size = i32::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "extio payload too large"))?;
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&(kind as i32).to_ne_bytes());
    header[4..].copy_from_slice(&size.to_ne_bytes());
    Ok(header)
}

/// Write one message: payload encoded first, then header and payload as two
/// writes. Callers sharing a stream must serialize calls.
pub fn write_message<W: Write>(writer: &mut W, message: &ExtMessage) -> io::Result<()> {
    let payload = message.encode_payload();
    let header = encode_header(message.message_type(), payload.len())?;
    writer.write_all(&header)?;
    writer.write_all(&payload)?;
    writer.flush()
}

fn read_exact_or_short<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::ShortRead {
            expected: buf.len(),
        },
        _ => ProtocolError::Io(e),
    })
}

/// Read one message. Any short read is a protocol error.
pub fn read_message<R: Read>(reader: &mut R) -> Result<ExtMessage, ProtocolError> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_short(reader, &mut header)?;

    let mut raw = [0u8; 4];
    raw.copy_from_slice(&header[..4]);
    let raw_type = i32::from_ne_bytes(raw);
    raw.copy_from_slice(&header[4..]);
    let size = i32::from_ne_bytes(raw);

    if !(0..=MAX_PAYLOAD_SIZE).contains(&size) {
        return Err(ProtocolError::InvalidSize(size));
    }
    let kind = MessageType::from_raw(raw_type).ok_or(ProtocolError::UnknownType(raw_type))?;

    let mut payload = vec![0u8; size as usize];
    read_exact_or_short(reader, &mut payload)?;
    ExtMessage::decode_payload(kind, &payload)
}
