//! Wire Protocol Implementation
//!
//! This module implements EmberKV's length-prefixed binary protocol.
//!
//! ## Overview
//!
//! Every message is a frame: a 4-byte little-endian payload length
//! followed by the payload. Requests carry an argument list; responses
//! carry one tagged value.
//!
//! ```text
//! Request:   | u32 len | u32 argc | u32 len | bytes | u32 len | bytes | ...
//! Response:  | u32 len | tag | tag-specific payload
//! ```
//!
//! ## Modules
//!
//! - `frame`: framing, request encode/decode, size limits
//! - `types`: the `Response` enum and its tagged encoding
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{decode_request, encode_request, split_frame, Response};
//!
//! let wire = encode_request(&[b"set", b"name", b"ember"]).unwrap();
//! let (payload, _consumed) = split_frame(&wire).unwrap().unwrap();
//! let args = decode_request(payload).unwrap();
//! assert_eq!(args[0], &b"set"[..]);
//!
//! let encoded = Response::Int(1).encode();
//! let (value, _) = Response::decode(&encoded).unwrap();
//! assert_eq!(value, Response::Int(1));
//! ```

pub mod frame;
pub mod types;

// Re-export commonly used items for convenience
pub use frame::{
    decode_request, encode_frame, encode_request, split_frame, FrameError, HEADER_LEN, MAX_ARGS,
    MAX_MSG_SIZE,
};
pub use types::{code, tag, Response};
