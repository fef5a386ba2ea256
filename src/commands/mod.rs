//! Command Module
//!
//! Everything a client can run against a database. Connection-level
//! commands (AUTH, SELECT, MULTI, ...) live in [`crate::connection`]; this
//! module only knows about data.
//!
//! ## Architecture
//!
//! ```text
//! Client Request (array of bulk strings)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │    Session      │  (connection module: auth, MULTI, db gate)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  CommandTable   │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Arity        │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Database     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Strings
//! - `GET`, `SET`, `APPEND`, `STRLEN`, `GETSET`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`
//! - `MGET`, `MSET`, `MSETNX`, `SETNX`, `SETEX`, `PSETEX`
//!
//! ### Keys
//! - `DEL`, `EXISTS`, `TYPE`, `KEYS`
//! - `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`, `TTL`, `PTTL`, `PERSIST`
//! - `RENAME`, `RENAMENX`, `MOVE`
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//!
//! ### Lists
//! - `LPUSH`, `RPUSH`, `LPUSHX`, `RPUSHX`, `LPOP`, `RPOP`
//! - `LLEN`, `LINDEX`, `LINSERT`, `LRANGE`, `LSET`, `LTRIM`, `LREM`
//!
//! ### Hashes
//! - `HSET`, `HSETNX`, `HGET`, `HDEL`, `HEXISTS`, `HLEN`, `HSTRLEN`
//! - `HKEYS`, `HVALS`, `HGETALL`, `HINCRBY`, `HMGET`, `HMSET`

pub mod handler;
mod hashes;
mod keys;
mod lists;
mod strings;

pub use handler::{CommandContext, CommandError, CommandResult, CommandTable};
