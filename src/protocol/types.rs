//! Tagged Response Values
//!
//! This module defines the response side of the wire protocol: a single
//! tagged value per response payload.
//!
//! ## Encoding
//!
//! Every value starts with a one-byte tag; all integers are little-endian:
//!
//! - `0` Nil - no payload
//! - `1` Err - `i32` code, `u32` message length, message bytes
//! - `2` Str - `u32` length, bytes
//! - `3` Int - `i64`
//! - `4` Array - `u32` element count, then that many tagged values
//!
//! ## Examples
//!
//! Nil: `[0]`
//! Int(7): `[3, 7, 0, 0, 0, 0, 0, 0, 0]`
//! Str("hi"): `[2, 2, 0, 0, 0, b'h', b'i']`

use crate::protocol::frame::FrameError;
use bytes::Bytes;

/// Response value tags.
pub mod tag {
    pub const NIL: u8 = 0;
    pub const ERR: u8 = 1;
    pub const STR: u8 = 2;
    pub const INT: u8 = 3;
    pub const ARR: u8 = 4;
}

/// Error codes carried inside `Err` responses.
pub mod code {
    /// The command name or arity was not recognized.
    pub const UNKNOWN_COMMAND: i32 = 1;
    /// The encoded response would not fit in one frame.
    pub const RESPONSE_TOO_BIG: i32 = 2;
}

/// A single tagged response value.
///
/// This enum covers every response shape the server produces and can be
/// used for both encoding outgoing responses and decoding them on the
/// client side (tests, benchmarks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Absent value, or an acknowledgement with nothing to say.
    Nil,

    /// A request-level failure; the connection stays open.
    Err { code: i32, message: String },

    /// A binary-safe string value.
    Str(Bytes),

    /// A 64-bit signed integer.
    Int(i64),

    /// A sequence of further tagged values.
    Array(Vec<Response>),
}

impl Response {
    /// Creates a string response.
    pub fn str(data: impl Into<Bytes>) -> Self {
        Response::Str(data.into())
    }

    /// Creates an error response.
    pub fn err(code: i32, message: impl Into<String>) -> Self {
        Response::Err {
            code,
            message: message.into(),
        }
    }

    /// The canonical "unknown command" error.
    pub fn unknown_command() -> Self {
        Response::err(code::UNKNOWN_COMMAND, "unknown command")
    }

    /// The canonical "response too big" error.
    pub fn too_big() -> Self {
        Response::err(code::RESPONSE_TOO_BIG, "response is too big")
    }

    /// Returns true if this value is Nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Response::Nil)
    }

    /// Attempts to extract the inner bytes of a `Str`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Response::Str(data) => Some(data),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Response::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[Response]> {
        match self {
            Response::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Encodes this value into an existing buffer.
    ///
    /// The caller owns framing; this writes only the tagged payload.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Response::Nil => {
                out.push(tag::NIL);
            }
            Response::Err { code, message } => {
                out.push(tag::ERR);
                out.extend_from_slice(&code.to_le_bytes());
                out.extend_from_slice(&(message.len() as u32).to_le_bytes());
                out.extend_from_slice(message.as_bytes());
            }
            Response::Str(data) => {
                out.push(tag::STR);
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                out.extend_from_slice(data);
            }
            Response::Int(n) => {
                out.push(tag::INT);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Response::Array(items) => {
                out.push(tag::ARR);
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }

    /// Encodes this value into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Decodes one tagged value from the front of `buf`.
    ///
    /// Returns the value and the number of bytes consumed. The outer
    /// framing already guarantees the whole payload is present, so a
    /// field running past the end of `buf` is a protocol error, not a
    /// partial-data condition.
    pub fn decode(buf: &[u8]) -> Result<(Response, usize), FrameError> {
        let (&tag, rest) = buf.split_first().ok_or(FrameError::Truncated)?;
        match tag {
            tag::NIL => Ok((Response::Nil, 1)),
            tag::ERR => {
                if rest.len() < 8 {
                    return Err(FrameError::Truncated);
                }
                let code = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
                let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
                if rest.len() < 8 + len {
                    return Err(FrameError::Truncated);
                }
                let message = String::from_utf8_lossy(&rest[8..8 + len]).into_owned();
                Ok((Response::Err { code, message }, 1 + 8 + len))
            }
            tag::STR => {
                if rest.len() < 4 {
                    return Err(FrameError::Truncated);
                }
                let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                if rest.len() < 4 + len {
                    return Err(FrameError::Truncated);
                }
                let data = Bytes::copy_from_slice(&rest[4..4 + len]);
                Ok((Response::Str(data), 1 + 4 + len))
            }
            tag::INT => {
                if rest.len() < 8 {
                    return Err(FrameError::Truncated);
                }
                let n = i64::from_le_bytes([
                    rest[0], rest[1], rest[2], rest[3], rest[4], rest[5], rest[6], rest[7],
                ]);
                Ok((Response::Int(n), 1 + 8))
            }
            tag::ARR => {
                if rest.len() < 4 {
                    return Err(FrameError::Truncated);
                }
                let count = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                let mut consumed = 1 + 4;
                let mut items = Vec::new();
                for _ in 0..count {
                    let (item, used) = Response::decode(&buf[consumed..])?;
                    items.push(item);
                    consumed += used;
                }
                Ok((Response::Array(items), consumed))
            }
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}
