//! Debug Encoding
//!
//! A JSON-like rendering of [`Value`] used for human-readable replies, for the
//! wire form of dictionaries, and throughout the tests.
//!
//! ```text
//! [null, true, 42, 2.75, "a\tb"]
//! {"name":"rapidkv", "tags":["x"]}
//! ```
//!
//! Strings are double-quoted with `\t \r \n \b \f \" \\ \/` escapes and
//! `\u00XX` for the remaining control characters. Bytes outside ASCII pass
//! through untouched. Like the line-protocol encoder it is two-pass: the
//! measure pass and the write pass always agree on the length.

use super::types::{int_len, real_text, EncodeError, Value, Writer};

const SEPARATOR: &[u8] = b", ";
const HEX: &[u8; 16] = b"0123456789abcdef";

impl Value {
    /// Exact number of bytes [`Value::debug_write`] will produce.
    pub fn debug_measure(&self) -> usize {
        measure(self)
    }

    /// Writes the debug encoding into `buf`, failing if it is too short.
    pub fn debug_write(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let needed = measure(self);
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let mut writer = Writer::new(buf);
        write(self, &mut writer);
        Ok(writer.position())
    }

    /// Renders the debug encoding as a string.
    pub fn to_debug_string(&self) -> String {
        to_string(self)
    }
}

pub(crate) fn measure(value: &Value) -> usize {
    match value {
        Value::Null | Value::NullArray => 4,
        Value::Bool(true) => 4,
        Value::Bool(false) => 5,
        Value::Integer(n) => int_len(*n),
        Value::Real(r) if r.is_finite() => real_text(*r).len(),
        Value::Real(_) => 4,
        Value::SimpleString(s) | Value::Error(s) => quoted_len(s.as_bytes()),
        Value::BulkString(data) => quoted_len(data),
        Value::Array(values) => {
            let items: usize = values.iter().map(measure).sum();
            2 + items + separators(values.len())
        }
        Value::Dictionary(dict) => {
            let items: usize = dict
                .iter()
                .map(|(key, value)| quoted_len(key) + 1 + measure(value))
                .sum();
            2 + items + separators(dict.len())
        }
    }
}

pub(crate) fn write(value: &Value, w: &mut Writer<'_>) {
    match value {
        Value::Null | Value::NullArray => w.put(b"null"),
        Value::Bool(true) => w.put(b"true"),
        Value::Bool(false) => w.put(b"false"),
        Value::Integer(n) => w.put_int(*n),
        Value::Real(r) if r.is_finite() => w.put(real_text(*r).as_bytes()),
        Value::Real(_) => w.put(b"null"),
        Value::SimpleString(s) | Value::Error(s) => write_quoted(s.as_bytes(), w),
        Value::BulkString(data) => write_quoted(data, w),
        Value::Array(values) => {
            w.put_byte(b'[');
            for (i, item) in values.iter().enumerate() {
                if i > 0 {
                    w.put(SEPARATOR);
                }
                write(item, w);
            }
            w.put_byte(b']');
        }
        Value::Dictionary(dict) => {
            w.put_byte(b'{');
            for (i, (key, item)) in dict.iter().enumerate() {
                if i > 0 {
                    w.put(SEPARATOR);
                }
                write_quoted(key, w);
                w.put_byte(b':');
                write(item, w);
            }
            w.put_byte(b'}');
        }
    }
}

pub(crate) fn to_string(value: &Value) -> String {
    let mut buf = vec![0u8; measure(value)];
    let mut writer = Writer::new(&mut buf);
    write(value, &mut writer);
    match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn separators(count: usize) -> usize {
    count.saturating_sub(1) * SEPARATOR.len()
}

fn escape(byte: u8) -> Option<&'static [u8]> {
    match byte {
        b'"' => Some(b"\\\""),
        b'\\' => Some(b"\\\\"),
        b'/' => Some(b"\\/"),
        b'\t' => Some(b"\\t"),
        b'\r' => Some(b"\\r"),
        b'\n' => Some(b"\\n"),
        0x08 => Some(b"\\b"),
        0x0c => Some(b"\\f"),
        _ => None,
    }
}

fn escaped_len(byte: u8) -> usize {
    match escape(byte) {
        Some(seq) => seq.len(),
        None if byte < 0x20 => 6,
        None => 1,
    }
}

fn quoted_len(data: &[u8]) -> usize {
    2 + data.iter().map(|b| escaped_len(*b)).sum::<usize>()
}

fn write_quoted(data: &[u8], w: &mut Writer<'_>) {
    w.put_byte(b'"');
    for &byte in data {
        match escape(byte) {
            Some(seq) => w.put(seq),
            None if byte < 0x20 => {
                w.put(b"\\u00");
                w.put_byte(HEX[usize::from(byte >> 4)]);
                w.put_byte(HEX[usize::from(byte & 0x0f)]);
            }
            None => w.put_byte(byte),
        }
    }
    w.put_byte(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Dictionary;
    use bytes::Bytes;

    #[test]
    fn test_arrays() {
        let arr = Value::array(vec![Value::Null]);
        assert_eq!(arr.to_debug_string(), "[null]");

        let arr = Value::array(vec![Value::Null, Value::Bool(true), Value::Bool(false)]);
        assert_eq!(arr.to_debug_string(), "[null, true, false]");

        assert_eq!(Value::array(vec![]).to_debug_string(), "[]");
    }

    #[test]
    fn test_dictionaries() {
        let mut dict = Dictionary::new();
        dict.insert("Test", Value::array(vec![]));
        assert_eq!(Value::Dictionary(dict).to_debug_string(), "{\"Test\":[]}");

        let mut dict = Dictionary::new();
        dict.insert("Test1", Value::Bool(true));
        assert_eq!(
            Value::Dictionary(dict.clone()).to_debug_string(),
            "{\"Test1\":true}"
        );

        dict.insert("Test1", Value::Bool(false));
        dict.insert("Test2", Value::Integer(7));
        assert_eq!(
            Value::Dictionary(dict).to_debug_string(),
            "{\"Test1\":false, \"Test2\":7}"
        );
    }

    #[test]
    fn test_string_escapes() {
        let value = Value::bulk_string("a\"b\\c/d\te\rf\ng");
        assert_eq!(
            value.to_debug_string(),
            "\"a\\\"b\\\\c\\/d\\te\\rf\\ng\""
        );

        let value = Value::bulk_string(Bytes::from(vec![0x08, 0x0c, 0x01, 0x1f]));
        assert_eq!(value.to_debug_string(), "\"\\b\\f\\u0001\\u001f\"");
    }

    #[test]
    fn test_non_ascii_passes_through() {
        let value = Value::bulk_string("привет");
        assert_eq!(value.to_debug_string(), "\"привет\"");
    }

    #[test]
    fn test_scalars() {
        assert_eq!(Value::Integer(-15).to_debug_string(), "-15");
        assert_eq!(Value::Real(2.75).to_debug_string(), "2.75");
        assert_eq!(Value::Real(f64::NAN).to_debug_string(), "null");
        assert_eq!(Value::simple_string("OK").to_debug_string(), "\"OK\"");
        assert_eq!(Value::NullArray.to_debug_string(), "null");
    }

    #[test]
    fn test_measure_matches_write() {
        let mut dict = Dictionary::new();
        dict.insert("k\u{1}", Value::array(vec![Value::Real(1.5), Value::Null]));
        dict.insert("other", Value::bulk_string("x/y"));
        let values = vec![
            Value::Dictionary(dict),
            Value::array(vec![Value::Integer(i64::MIN), Value::bulk_string("\"")]),
            Value::Bool(false),
            Value::Real(f64::INFINITY),
        ];

        for value in values {
            let needed = value.debug_measure();
            let mut buf = vec![0u8; needed];
            assert_eq!(value.debug_write(&mut buf), Ok(needed));
            assert!(value.debug_write(&mut buf[..needed - 1]).is_err());
        }
    }
}
