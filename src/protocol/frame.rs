//! Frame and Request Codec
//!
//! Every protocol message travels inside a frame: a 4-byte little-endian
//! length followed by that many payload bytes. A request payload is a
//! 4-byte argument count followed by `(u32 length, bytes)` pairs; a
//! response payload is one tagged value (see [`crate::protocol::types`]).
//!
//! ## Framing vs. parsing
//!
//! The two layers fail differently. Framing is incremental: a header or
//! payload that has not fully arrived yet is *incomplete*, reported as
//! `Ok(None)`, and the caller reads more bytes. Once a whole frame is in
//! hand, parsing it is all-or-nothing: any field running past the frame
//! boundary, trailing garbage, or an out-of-range count is a protocol
//! violation and the connection is closed.
//!
//! A declared frame length above [`MAX_MSG_SIZE`] is rejected from the
//! header alone, before any payload is read or buffered.

use bytes::Bytes;
use thiserror::Error;

/// Size of the frame header: a `u32` payload length.
pub const HEADER_LEN: usize = 4;

/// Maximum payload size of a single frame.
pub const MAX_MSG_SIZE: usize = 4096;

/// Maximum number of arguments in one request.
pub const MAX_ARGS: usize = 1024;

/// Protocol violations. Every variant is connection-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The header declares a payload larger than [`MAX_MSG_SIZE`].
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A length-prefixed field extends past the end of its frame.
    #[error("truncated field inside frame")]
    Truncated,

    /// Bytes remain after the declared argument list was consumed.
    #[error("{len} trailing bytes after request arguments")]
    TrailingBytes { len: usize },

    /// The request declares more arguments than [`MAX_ARGS`].
    #[error("too many arguments: {argc} (max: {max})")]
    TooManyArgs { argc: usize, max: usize },

    /// A response payload starts with an unrecognized tag byte.
    #[error("unknown response tag: {0:#04x}")]
    UnknownTag(u8),
}

/// Splits one frame off the front of `buf`.
///
/// Returns `Ok(Some((payload, frame_len)))` when a complete frame is
/// buffered, where `frame_len` counts the header too, or `Ok(None)` when
/// more bytes are needed. An oversize length in the header fails without
/// waiting for (or allocating room for) the claimed payload.
pub fn split_frame(buf: &[u8]) -> Result<Option<(&[u8], usize)>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_MSG_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_MSG_SIZE,
        });
    }
    if buf.len() < HEADER_LEN + len {
        return Ok(None);
    }
    Ok(Some((&buf[HEADER_LEN..HEADER_LEN + len], HEADER_LEN + len)))
}

/// Decodes a request payload into its argument list.
///
/// The payload must be exactly one argument list: a `u32` count, then
/// that many `(u32 length, bytes)` pairs, with nothing left over.
pub fn decode_request(payload: &[u8]) -> Result<Vec<Bytes>, FrameError> {
    let (argc, mut pos) = read_u32(payload, 0)?;
    let argc = argc as usize;
    if argc > MAX_ARGS {
        return Err(FrameError::TooManyArgs {
            argc,
            max: MAX_ARGS,
        });
    }

    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        let (len, data_start) = read_u32(payload, pos)?;
        let len = len as usize;
        let data_end = data_start.checked_add(len).ok_or(FrameError::Truncated)?;
        if data_end > payload.len() {
            return Err(FrameError::Truncated);
        }
        args.push(Bytes::copy_from_slice(&payload[data_start..data_end]));
        pos = data_end;
    }

    if pos != payload.len() {
        return Err(FrameError::TrailingBytes {
            len: payload.len() - pos,
        });
    }
    Ok(args)
}

/// Encodes an argument list as a complete frame, header included.
///
/// This is the client half of the codec, used by tests and benchmarks.
pub fn encode_request(args: &[&[u8]]) -> Result<Vec<u8>, FrameError> {
    let payload_len: usize = 4 + args.iter().map(|a| 4 + a.len()).sum::<usize>();
    if payload_len > MAX_MSG_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: payload_len,
            max: MAX_MSG_SIZE,
        });
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload_len);
    out.extend_from_slice(&(payload_len as u32).to_le_bytes());
    out.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        out.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        out.extend_from_slice(arg);
    }
    Ok(out)
}

/// Wraps an already-encoded payload in a frame header.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

fn read_u32(buf: &[u8], pos: usize) -> Result<(u32, usize), FrameError> {
    let end = pos.checked_add(4).ok_or(FrameError::Truncated)?;
    if end > buf.len() {
        return Err(FrameError::Truncated);
    }
    let value = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let frame = encode_request(&[b"set", b"a", b"1"]).unwrap();
        let (payload, consumed) = split_frame(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());

        let args = decode_request(payload).unwrap();
        assert_eq!(args, vec![&b"set"[..], &b"a"[..], &b"1"[..]]);
    }

    #[test]
    fn test_split_incomplete_header() {
        assert_eq!(split_frame(&[1, 0]).unwrap(), None);
    }

    #[test]
    fn test_split_incomplete_payload() {
        // Header declares 10 payload bytes; only 3 arrived.
        let mut buf = 10u32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        assert_eq!(split_frame(&buf).unwrap(), None);
    }

    #[test]
    fn test_split_oversize_rejected_from_header() {
        // 0xFFFFFFFF length must be rejected with no payload present at all.
        let buf = 0xFFFF_FFFFu32.to_le_bytes();
        assert!(matches!(
            split_frame(&buf),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_split_boundary_size() {
        let mut buf = (MAX_MSG_SIZE as u32).to_le_bytes().to_vec();
        buf.resize(HEADER_LEN + MAX_MSG_SIZE, 0);
        let (payload, _) = split_frame(&buf).unwrap().unwrap();
        assert_eq!(payload.len(), MAX_MSG_SIZE);

        let buf = ((MAX_MSG_SIZE + 1) as u32).to_le_bytes();
        assert!(split_frame(&buf).is_err());
    }

    #[test]
    fn test_decode_truncated_argument() {
        // argc=1, argument declares 100 bytes, payload has 2.
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(b"ab");
        assert_eq!(decode_request(&payload), Err(FrameError::Truncated));
    }

    #[test]
    fn test_decode_missing_argc() {
        assert_eq!(decode_request(&[1, 0]), Err(FrameError::Truncated));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        // argc=1 with one 1-byte argument, then two stray bytes.
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(b'x');
        payload.extend_from_slice(b"!!");
        assert_eq!(
            decode_request(&payload),
            Err(FrameError::TrailingBytes { len: 2 })
        );
    }

    #[test]
    fn test_decode_too_many_args() {
        let payload = ((MAX_ARGS + 1) as u32).to_le_bytes();
        assert!(matches!(
            decode_request(&payload),
            Err(FrameError::TooManyArgs { .. })
        ));
    }

    #[test]
    fn test_decode_empty_argument() {
        let frame = encode_request(&[b"get", b""]).unwrap();
        let (payload, _) = split_frame(&frame).unwrap().unwrap();
        let args = decode_request(payload).unwrap();
        assert_eq!(args.len(), 2);
        assert!(args[1].is_empty());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut buf = encode_request(&[b"get", b"a"]).unwrap();
        let first_len = buf.len();
        buf.extend_from_slice(&encode_request(&[b"get", b"b"]).unwrap());

        let (_, consumed) = split_frame(&buf).unwrap().unwrap();
        assert_eq!(consumed, first_len);

        let (payload, _) = split_frame(&buf[consumed..]).unwrap().unwrap();
        let args = decode_request(payload).unwrap();
        assert_eq!(args[1], &b"b"[..]);
    }
}
