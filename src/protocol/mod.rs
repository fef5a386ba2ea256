//! Wire Protocol
//!
//! The value model shared by every layer of the server, its two encoders and
//! the request decoder.
//!
//! ## Modules
//!
//! - `types`: the [`Value`] sum type, [`Dictionary`] and the line-protocol encoder
//! - `json`: the debug (JSON-like) encoder
//! - `parser`: incremental decoder for incoming requests, including inline commands
//!
//! ## Example
//!
//! ```ignore
//! use rapidkv::protocol::{decode, Value};
//!
//! // Decoding a request
//! let (request, consumed) = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//!
//! // Encoding a reply in two passes
//! let reply = Value::bulk_string("Ariz");
//! let mut buf = vec![0u8; reply.measure()];
//! reply.write(&mut buf).unwrap();
//! ```

pub mod json;
pub mod parser;
pub mod types;

pub use parser::{decode, parse_message, skip_line, ParseError, ParseResult, RespParser};
pub use types::{Dictionary, EncodeError, Value};
