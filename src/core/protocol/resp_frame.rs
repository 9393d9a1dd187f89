// src/core/protocol/resp_frame.rs

//! Implements the RESP (REdis Serialization Protocol) frame structure and the
//! corresponding `Encoder` and `Decoder` for network communication.

use crate::core::BerylError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits. A server that claims a larger frame is treated as
// malformed rather than trusted with the allocation.
const MAX_ARRAY_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_LEN: usize = 512 * 1024 * 1024; // 512MB max bulk string size.
const MAX_RECURSION_DEPTH: usize = 64;

/// A single frame of the RESP protocol: the decoded form of every reply the
/// server can send, and (as an array of bulk strings) the encoded form of
/// every command the client sends.
///
/// `Null` is the null bulk string (`$-1\r\n`); `NullArray` is the null array
/// (`*-1\r\n`). The two are distinct on the wire and stay distinct here.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// A convenience method to encode a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, BerylError> {
        let mut buf = BytesMut::new();
        RespCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Returns the textual content of a simple string or UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespFrame::SimpleString(s) => Some(s.as_str()),
            RespFrame::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the raw bytes of a bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespFrame::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the integer value, if this frame is an integer reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RespFrame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Consumes the frame and returns its elements, if it is an array.
    pub fn into_array(self) -> Option<Vec<RespFrame>> {
        match self {
            RespFrame::Array(items) => Some(items),
            _ => None,
        }
    }

    /// True for both the null bulk string and the null array.
    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::Null | RespFrame::NullArray)
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default)]
pub struct RespCodec;

impl Encoder<RespFrame> for RespCodec {
    type Error = BerylError;

    /// Encodes a `RespFrame` into a `BytesMut` buffer according to the RESP specification.
    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut int_buf = itoa::Buffer::new();
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(int_buf.format(i).as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(int_buf.format(b.len()).as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::NullArray => {
                dst.extend_from_slice(b"*-1\r\n");
            }
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(int_buf.format(arr.len()).as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    // Recursively encode each frame in the array.
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespCodec {
    type Item = RespFrame;
    type Error = BerylError;

    /// Decodes exactly one `RespFrame` from the head of the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not yet contain a
    /// complete frame; `Framed` keeps the buffer and calls again after the
    /// next read. Any other failure is a real protocol violation.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut bytes = &src[..];
        match decode_recursive(&mut bytes, 0) {
            Ok(frame) => {
                let len = src.len() - bytes.len();
                src.advance(len);
                Ok(Some(frame))
            }
            Err(BerylError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A recursive helper to decode a single frame.
/// The `bytes` slice is advanced past everything consumed; on
/// `BerylError::Incomplete` nothing is considered consumed and the caller
/// must re-feed the whole buffer once more data has arrived.
fn decode_recursive(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, BerylError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(BerylError::Protocol(
            "RESP recursion depth limit exceeded".to_string(),
        ));
    }

    if bytes.is_empty() {
        return Err(BerylError::Incomplete);
    }

    match bytes[0] {
        b'+' => parse_simple_string(bytes),
        b'-' => parse_error(bytes),
        b':' => parse_integer(bytes),
        b'$' => parse_bulk_string(bytes),
        b'*' => parse_array(bytes, depth),
        other => Err(BerylError::Protocol(format!(
            "invalid frame type tag 0x{other:02x}"
        ))),
    }
}

/// Finds the next CRLF and returns the line before it, advancing past both.
fn parse_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], BerylError> {
    if let Some(pos) = find_crlf(bytes) {
        let line = &bytes[..pos];
        *bytes = &bytes[pos + CRLF_LEN..];
        Ok(line)
    } else {
        Err(BerylError::Incomplete)
    }
}

/// Parses the integer field of a `$` or `*` header line. `-1` is the only
/// legal negative value (null marker); anything else malformed is fatal.
fn parse_length(line: &[u8], what: &str) -> Result<isize, BerylError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| BerylError::Protocol(format!("non-ASCII {what} length")))?;
    let len = text
        .parse::<isize>()
        .map_err(|_| BerylError::Protocol(format!("malformed {what} length {text:?}")))?;
    if len < -1 {
        return Err(BerylError::Protocol(format!("negative {what} length {len}")));
    }
    Ok(len)
}

/// Parses a Simple String (e.g., `+OK\r\n`).
fn parse_simple_string(bytes: &mut &[u8]) -> Result<RespFrame, BerylError> {
    *bytes = &bytes[1..];
    let line = parse_line(bytes)?;
    Ok(RespFrame::SimpleString(
        String::from_utf8_lossy(line).to_string(),
    ))
}

/// Parses an Error (e.g., `-ERR message\r\n`).
fn parse_error(bytes: &mut &[u8]) -> Result<RespFrame, BerylError> {
    *bytes = &bytes[1..];
    let line = parse_line(bytes)?;
    Ok(RespFrame::Error(String::from_utf8_lossy(line).to_string()))
}

/// Parses an Integer (e.g., `:1000\r\n`).
fn parse_integer(bytes: &mut &[u8]) -> Result<RespFrame, BerylError> {
    *bytes = &bytes[1..];
    let line = parse_line(bytes)?;
    let text = std::str::from_utf8(line)
        .map_err(|_| BerylError::Protocol("non-ASCII integer reply".to_string()))?;
    let i = text
        .parse::<i64>()
        .map_err(|_| BerylError::Protocol(format!("malformed integer reply {text:?}")))?;
    Ok(RespFrame::Integer(i))
}

/// Parses a Bulk String (e.g., `$5\r\nhello\r\n`), including the `$-1` null form.
fn parse_bulk_string(bytes: &mut &[u8]) -> Result<RespFrame, BerylError> {
    *bytes = &bytes[1..];
    let line = parse_line(bytes)?;
    let len = parse_length(line, "bulk string")?;

    if len == -1 {
        return Ok(RespFrame::Null);
    }

    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(BerylError::Protocol(format!(
            "bulk string length {len} exceeds limit"
        )));
    }

    if bytes.len() < len + CRLF_LEN {
        return Err(BerylError::Incomplete);
    }

    if &bytes[len..len + CRLF_LEN] != CRLF {
        return Err(BerylError::Protocol(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&bytes[..len]);
    *bytes = &bytes[len + CRLF_LEN..];
    Ok(RespFrame::BulkString(data))
}

/// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`), including `*-1`.
fn parse_array(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, BerylError> {
    *bytes = &bytes[1..];
    let line = parse_line(bytes)?;
    let len = parse_length(line, "array")?;

    if len == -1 {
        return Ok(RespFrame::NullArray);
    }

    let len = len as usize;
    if len > MAX_ARRAY_ELEMENTS {
        return Err(BerylError::Protocol(format!(
            "array length {len} exceeds limit"
        )));
    }

    let mut frames = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        frames.push(decode_recursive(bytes, depth + 1)?);
    }
    Ok(RespFrame::Array(frames))
}

/// Helper function to find the next CRLF sequence in a buffer.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}
