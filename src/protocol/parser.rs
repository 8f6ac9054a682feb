//! Incremental Request-Frame Decoder
//!
//! Requests are RESP arrays of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<L>\r\n<L bytes>\r\n      (repeated N times, L = -1 means a null element)
//! ```
//!
//! Anything else (inline commands, nested arrays, scalar frames) is a
//! protocol error. The same decoder reads append-log records during replay.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((args, consumed)))` - A complete frame, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - The framing is broken and cannot be recovered
//!
//! The connection loop appends socket data to a buffer and calls `parse()`
//! until it yields `None`. Replay uses the distinction between `None` and
//! `Err` to tell a torn trailing record from interior corruption.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding a request frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A header line did not start with the sigil the grammar requires
    #[error("expected {expected:?} header, found byte {found:#04x}")]
    UnexpectedPrefix { expected: char, found: u8 },

    /// Invalid integer in a header line
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Header line is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The frame exceeds a size limit
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one request frame
pub const MAX_ARGUMENTS: usize = 1024 * 1024;

/// A decoded request: each element is a `BulkString` or `Null`.
pub type Request = Vec<RespValue>;

/// An incremental request-frame parser.
///
/// # Example
///
/// ```
/// use driftkv::protocol::parser::RequestParser;
/// use driftkv::protocol::RespValue;
/// use bytes::Bytes;
///
/// let mut parser = RequestParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (args, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(consumed, buffer.len());
/// assert_eq!(args[1], RespValue::bulk_string(Bytes::from("name")));
/// ```
#[derive(Debug, Default)]
pub struct RequestParser {
    /// Number of complete frames decoded so far
    frames: u64,
}

impl RequestParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { frames: 0 }
    }

    /// Number of frames this parser has decoded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Attempts to decode one request frame from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if buf[0] != prefix::ARRAY {
            return Err(ParseError::UnexpectedPrefix {
                expected: prefix::ARRAY as char,
                found: buf[0],
            });
        }

        let (count, mut consumed) = match parse_header(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }
        let count = count as usize;
        if count > MAX_ARGUMENTS {
            return Err(ParseError::MessageTooLarge {
                size: count,
                max: MAX_ARGUMENTS,
            });
        }

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            match parse_bulk(&buf[consumed..])? {
                Some((value, used)) => {
                    args.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        self.frames += 1;
        Ok(Some((args, consumed)))
    }
}

/// Parses a `<sigil><integer>\r\n` header line at the start of `buf`.
///
/// Returns the integer and the number of bytes the line occupies.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let text =
        std::str::from_utf8(&buf[1..1 + end]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    let n: i64 = text
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", text, e)))?;

    // prefix + digits + CRLF
    Ok(Some((n, 1 + end + 2)))
}

/// Parses one element: `$<length>\r\n<data>\r\n` or `$-1\r\n`.
fn parse_bulk(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::BULK_STRING {
        return Err(ParseError::UnexpectedPrefix {
            expected: prefix::BULK_STRING as char,
            found: buf[0],
        });
    }

    let (length, data_start) = match parse_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ParseError::ProtocolError(format!(
            "bulk string of declared length {} is not followed by CRLF",
            length
        )));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((RespValue::BulkString(data), total_needed)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to decode a single request frame from bytes.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    RequestParser::new().parse(buf)
}
