//! Incremental Line-Protocol Decoder
//!
//! This module decodes request frames from a byte buffer. Bulk payloads are
//! copied once into `Bytes` and shared from there on.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! This design allows the caller to:
//! 1. Append incoming network data to a buffer
//! 2. Call `parse()` to attempt parsing
//! 3. If successful, advance the buffer by `consumed` bytes
//! 4. If incomplete, wait for more data
//! 5. If error, report it and skip past the offending line with [`skip_line`]
//!
//! ## Inline Commands
//!
//! A line that does not start with one of `+ - : $ *` is an inline command:
//! it is split on whitespace into bulk strings, with double-quoted groups
//! kept together.
//!
//! ```text
//! SET greeting "hello world"\r\n  ──>  ["SET", "greeting", "hello world"]
//! ```

use crate::protocol::types::{prefix, Value, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The frame ended before it was complete
    #[error("unexpected end of input")]
    Truncated,

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error message or inline command
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid multibulk length: {0}")]
    InvalidArrayLength(i64),

    /// An inline command opened a double quote and never closed it
    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,

    /// Protocol violation (missing CRLF, etc.)
    #[error("{0}")]
    ProtocolError(String),

    /// The frame exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a line without its CRLF: headers, simple strings and
/// inline commands. Bulk payloads are bounded by [`MAX_BULK_SIZE`] instead.
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on the capacity reserved up front for a declared array length.
const MAX_PREALLOC: usize = 1024;

/// An incremental line-protocol parser.
///
/// # Example
///
/// ```ignore
/// use rapidkv::protocol::parser::RespParser;
/// use bytes::{Buf, BytesMut};
///
/// let mut parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
///
/// if let Some((value, consumed)) = parser.parse(&buffer)? {
///     buffer.advance(consumed);
///     println!("Parsed: {:?}", value);
/// }
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one frame from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(parse_line(buf)?
                .map(|(line, used)| (Value::SimpleString(line.to_string()), used))),
            prefix::ERROR => {
                Ok(parse_line(buf)?.map(|(line, used)| (Value::Error(line.to_string()), used)))
            }
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            _ => self.parse_inline(buf),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::INTEGER);

        match parse_line(buf)? {
            Some((line, consumed)) => {
                let n: i64 = line
                    .parse()
                    .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
                Ok(Some((Value::Integer(n), consumed)))
            }
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (length, header) = match parse_length(buf)? {
            Some(found) => found,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((Value::Null, header)));
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

        let total_needed = header + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((Value::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, header) = match parse_length(buf)? {
            Some(found) => found,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((Value::NullArray, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOC));
        let mut consumed = header;

        self.depth += 1;

        for _ in 0..count {
            if consumed >= buf.len() {
                return Ok(None);
            }

            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((Value::Array(elements), consumed)))
    }

    fn parse_inline(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        let crlf_pos = match find_crlf(buf) {
            Some(pos) => pos,
            None => return line_pending(buf),
        };

        let line = std::str::from_utf8(&buf[..crlf_pos])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        let elements = split_inline(line)?
            .into_iter()
            .map(|token| Value::BulkString(Bytes::from(token)))
            .collect();

        Ok(Some((Value::Array(elements), crlf_pos + 2)))
    }
}

/// Splits an inline command line into tokens.
///
/// Whitespace separates tokens; a double-quoted run is kept as part of one
/// token and may contain `\"`, `\\`, `\n`, `\r` and `\t` escapes.
pub fn split_inline(line: &str) -> ParseResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' => quoted = false,
                '\\' => match chars.next() {
                    Some('n') => current.push('\n'),
                    Some('r') => current.push('\r'),
                    Some('t') => current.push('\t'),
                    Some(other) => current.push(other),
                    None => return Err(ParseError::UnbalancedQuotes),
                },
                _ => current.push(c),
            }
        } else if c == '"' {
            quoted = true;
            started = true;
        } else if c.is_whitespace() {
            if started {
                tokens.push(std::mem::take(&mut current));
                started = false;
            }
        } else {
            current.push(c);
            started = true;
        }
    }

    if quoted {
        return Err(ParseError::UnbalancedQuotes);
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Reads a `<prefix><text>\r\n` line, returning the text and bytes consumed.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + 2)))
        }
        None => line_pending(buf),
    }
}

/// Outcome for a line whose CRLF has not arrived yet.
fn line_pending<T>(buf: &[u8]) -> ParseResult<Option<T>> {
    if buf.len() > MAX_INLINE_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: buf.len(),
            max: MAX_INLINE_SIZE,
        });
    }
    Ok(None)
}

/// Reads the `<prefix><length>\r\n` header of a bulk string or array.
fn parse_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match parse_line(buf)? {
        Some((line, consumed)) => {
            let n: i64 = line
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
            Ok(Some((n, consumed)))
        }
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}

/// Number of bytes to discard after a parse error so decoding can resume at
/// the next line. Returns the whole buffer length when no CRLF is buffered.
pub fn skip_line(buf: &[u8]) -> usize {
    match find_crlf(buf) {
        Some(pos) => pos + 2,
        None => buf.len(),
    }
}

/// Helper function to parse a single frame from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
    RespParser::new().parse(buf)
}

/// Decodes exactly one complete frame, treating missing bytes as an error.
pub fn decode(buf: &[u8]) -> ParseResult<(Value, usize)> {
    parse_message(buf)?.ok_or(ParseError::Truncated)
}
