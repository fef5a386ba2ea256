//! Value Model and Line-Protocol Encoding
//!
//! This module defines [`Value`], the tagged variant exchanged between the
//! decoder, the command handlers and the storage engine, together with its
//! line-protocol (RESP) encoder.
//!
//! ## Protocol Format
//!
//! Each frame starts with a type prefix byte and ends with CRLF:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (`$-1` is the null value)
//! - `*` Array (`*-1` is the null array)
//!
//! ## Two-Pass Encoding
//!
//! Encoding is split into [`Value::measure`] and [`Value::write`]. The first
//! pass computes the exact number of bytes the frame occupies, the second
//! fills a caller-provided slice with exactly that many bytes. Callers size a
//! single buffer up front and never reallocate while writing:
//!
//! ```text
//!   measure(v) = n   ──>   buf = [0u8; n]   ──>   write(v, &mut buf) == Ok(n)
//! ```
//!
//! Values without a native wire form are mapped as follows:
//! - `Bool` is sent as the integer `1` or `0`
//! - `Real` is sent as a bulk string holding its decimal text
//! - `Dictionary` is sent as a bulk string holding its debug encoding

use bytes::Bytes;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::json;

/// The CRLF terminator used in the line protocol
pub const CRLF: &[u8] = b"\r\n";

/// Line-protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

const NULL_BULK: &[u8] = b"$-1\r\n";
const NULL_ARRAY: &[u8] = b"*-1\r\n";

/// Errors raised by the write pass of an encoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The destination slice is shorter than the measured frame
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// A protocol value.
///
/// `Clone` is a deep copy: arrays and dictionaries are copied recursively,
/// so a cloned value never observes later mutation of the original.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absent value. Encoded as the null bulk string `$-1\r\n`.
    Null,

    /// Boolean flag.
    Bool(bool),

    /// 64-bit signed integer. Format: `:<integer>\r\n`
    Integer(i64),

    /// 64-bit float.
    Real(f64),

    /// Status reply. Must not contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Error reply. Must not contain CR or LF.
    /// Format: `-<message>\r\n`
    Error(String),

    /// Binary-safe string.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Ordered sequence of values, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<Value>),

    /// The null array, distinct from an empty array. Format: `*-1\r\n`
    NullArray,

    /// String-keyed map of values.
    Dictionary(Dictionary),
}

impl Value {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use rapidkv::protocol::types::Value;
    /// let ok = Value::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        Value::SimpleString(s.into())
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use rapidkv::protocol::types::Value;
    /// let err = Value::error("ERR unknown command 'foo'");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Value::Error(s.into())
    }

    /// Creates a new integer response.
    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Creates a new bulk string.
    ///
    /// # Example
    /// ```
    /// use rapidkv::protocol::types::Value;
    /// use bytes::Bytes;
    /// let bulk = Value::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Value::BulkString(data.into())
    }

    pub fn boolean(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn real(r: f64) -> Self {
        Value::Real(r)
    }

    /// Creates a null response.
    pub fn null() -> Self {
        Value::Null
    }

    pub fn null_array() -> Self {
        Value::NullArray
    }

    /// Creates an array response.
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    pub fn dictionary(dict: Dictionary) -> Self {
        Value::Dictionary(dict)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Value::SimpleString("OK".to_string())
    }

    /// Reply to a command accepted into a transaction queue
    pub fn queued() -> Self {
        Value::SimpleString("QUEUED".to_string())
    }

    /// Common response for PONG
    pub fn pong() -> Self {
        Value::SimpleString("PONG".to_string())
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Extracts the raw bytes of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::BulkString(b) => Some(b),
            Value::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(s) => Some(s),
            Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_dictionary_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Name of the stored shape as reported by TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null | Value::NullArray => "none",
            Value::Array(_) => "list",
            Value::Dictionary(_) => "hash",
            _ => "string",
        }
    }

    /// Exact number of bytes [`Value::write`] will produce.
    pub fn measure(&self) -> usize {
        match self {
            Value::Null | Value::NullArray => NULL_BULK.len(),
            Value::Bool(_) => 4,
            Value::Integer(n) => 1 + int_len(*n) + 2,
            Value::Real(r) => bulk_len(real_text(*r).len()),
            Value::SimpleString(s) | Value::Error(s) => 1 + s.len() + 2,
            Value::BulkString(data) => bulk_len(data.len()),
            Value::Array(values) => {
                let header = 1 + int_len(values.len() as i64) + 2;
                values.iter().fold(header, |acc, v| acc + v.measure())
            }
            Value::Dictionary(_) => bulk_len(json::measure(self)),
        }
    }

    /// Writes the line-protocol frame into `buf` and returns the number of
    /// bytes written, which always equals [`Value::measure`].
    ///
    /// Fails without touching `buf` if it is shorter than the frame.
    pub fn write(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let needed = self.measure();
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let mut writer = Writer::new(buf);
        self.write_wire(&mut writer);
        Ok(writer.position())
    }

    /// Serializes the value to a freshly allocated buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the serialized value to an existing buffer.
    ///
    /// The buffer grows by exactly one `measure()` worth of bytes.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.resize(start + self.measure(), 0);
        let mut writer = Writer::new(&mut buf[start..]);
        self.write_wire(&mut writer);
    }

    fn write_wire(&self, w: &mut Writer<'_>) {
        match self {
            Value::Null => w.put(NULL_BULK),
            Value::NullArray => w.put(NULL_ARRAY),
            Value::Bool(b) => w.put(if *b { b":1\r\n" } else { b":0\r\n" }),
            Value::Integer(n) => {
                w.put_byte(prefix::INTEGER);
                w.put_int(*n);
                w.put(CRLF);
            }
            Value::Real(r) => w.put_bulk(real_text(*r).as_bytes()),
            Value::SimpleString(s) => {
                w.put_byte(prefix::SIMPLE_STRING);
                w.put(s.as_bytes());
                w.put(CRLF);
            }
            Value::Error(s) => {
                w.put_byte(prefix::ERROR);
                w.put(s.as_bytes());
                w.put(CRLF);
            }
            Value::BulkString(data) => w.put_bulk(data),
            Value::Array(values) => {
                w.put_byte(prefix::ARRAY);
                w.put_int(values.len() as i64);
                w.put(CRLF);
                for value in values {
                    value.write_wire(w);
                }
            }
            Value::Dictionary(_) => {
                w.put_byte(prefix::BULK_STRING);
                w.put_int(json::measure(self) as i64);
                w.put(CRLF);
                json::write(self, w);
                w.put(CRLF);
            }
        }
    }
}

impl From<Dictionary> for Value {
    fn from(dict: Dictionary) -> Self {
        Value::Dictionary(dict)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::SimpleString(s) => write!(f, "\"{}\"", s),
            Value::Error(s) => write!(f, "(error) {}", s),
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::Bool(b) => write!(f, "(integer) {}", u8::from(*b)),
            Value::Real(r) => write!(f, "\"{}\"", real_text(*r)),
            Value::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Value::Null | Value::NullArray => write!(f, "(nil)"),
            Value::Dictionary(_) => f.write_str(&json::to_string(self)),
            Value::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

/// A string-keyed map of values.
///
/// Inserting [`Value::Null`] deletes the key instead of storing a null.
/// Iteration order is by key bytes, which keeps the debug encoding stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<Bytes, Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    /// A `Null` value removes the key.
    pub fn insert(&mut self, key: impl Into<Bytes>, value: Value) -> Option<Value> {
        let key = key.into();
        if value.is_null() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, value)
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Bytes, Value> {
        self.entries.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Bytes, Value> {
        self.entries.keys()
    }

    pub fn values(&self) -> btree_map::Values<'_, Bytes, Value> {
        self.entries.values()
    }
}

impl<K: Into<Bytes>> FromIterator<(K, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Bytes, &'a Value);
    type IntoIter = btree_map::Iter<'a, Bytes, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Cursor over a slice that has already been sized by a measure pass.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    #[inline]
    pub(crate) fn put_byte(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
    }

    pub(crate) fn put_int(&mut self, n: i64) {
        let mut digits = [0u8; 20];
        let mut i = digits.len();
        let mut m = n.unsigned_abs();
        loop {
            i -= 1;
            digits[i] = b'0' + (m % 10) as u8;
            m /= 10;
            if m == 0 {
                break;
            }
        }
        if n < 0 {
            i -= 1;
            digits[i] = b'-';
        }
        self.put(&digits[i..]);
    }

    fn put_bulk(&mut self, data: &[u8]) {
        self.put_byte(prefix::BULK_STRING);
        self.put_int(data.len() as i64);
        self.put(CRLF);
        self.put(data);
        self.put(CRLF);
    }
}

/// Number of characters in the decimal rendering of `n`.
pub(crate) fn int_len(n: i64) -> usize {
    let mut len = usize::from(n < 0);
    let mut m = n.unsigned_abs();
    loop {
        len += 1;
        m /= 10;
        if m == 0 {
            return len;
        }
    }
}

pub(crate) fn real_text(r: f64) -> String {
    r.to_string()
}

fn bulk_len(payload: usize) -> usize {
    1 + int_len(payload as i64) + 2 + payload + 2
}
