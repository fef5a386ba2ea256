//! # RapidKV - A Sharded, Redis-Compatible In-Memory Key-Value Server
//!
//! RapidKV speaks the Redis wire protocol (RESP) and keeps everything in
//! memory. Each numbered database is split into independently locked shards,
//! keys may carry a time-to-live, and clients can batch commands with
//! `MULTI`/`EXEC`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                Server                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Accept loop │───>│ Connection  │───>│  Session    │                  │
//! │  │ (Listener)  │    │  Handler    │    │ (per client)│                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │ CommandTable            │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │  Decoder /  │    │      DatabaseRegistry  (db 0 .. db N)        │   │
//! │  │  Encoders   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └───▲────┘ └───▲────┘ └───▲────┘ └───▲────┘ │   │
//! │                     └──────┼──────────┼──────────┼──────────┼──────┘   │
//! │                            └──── one sweep task per shard ──┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use rapidkv::{Config, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Arc::new(Server::new(Config::default()));
//!     let listener = server.bind().await?;
//!     server.serve(listener).await
//! }
//! ```
//!
//! ## Supported Commands
//!
//! ### Connection
//! - `AUTH password`, `PING [message]`, `ECHO message`, `SELECT index`, `QUIT`
//! - `MULTI`, `EXEC`, `DISCARD`
//!
//! ### Keys
//! - `DEL`, `EXISTS`, `TYPE`, `KEYS pattern`, `RENAME`, `RENAMENX`, `MOVE`
//! - `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`, `TTL`, `PTTL`, `PERSIST`
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//!
//! ### Strings
//! - `GET`, `SET key value [EX seconds] [PX milliseconds] [NX|XX]`, `GETSET`
//! - `SETNX`, `SETEX`, `PSETEX`, `MGET`, `MSET`, `MSETNX`
//! - `APPEND`, `STRLEN`, `INCR`, `DECR`, `INCRBY`, `DECRBY`
//!
//! ### Lists
//! - `LPUSH`, `RPUSH`, `LPUSHX`, `RPUSHX`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`
//! - `LINSERT`, `LRANGE`, `LSET`, `LTRIM`, `LREM`
//!
//! ### Hashes
//! - `HSET`, `HMSET`, `HSETNX`, `HGET`, `HMGET`, `HDEL`, `HEXISTS`, `HLEN`
//! - `HSTRLEN`, `HKEYS`, `HVALS`, `HGETALL`, `HINCRBY`
//!
//! ## Module Overview
//!
//! - [`protocol`]: value model, RESP and debug encoders, request decoder
//! - [`storage`]: sharded databases, expiry sweepers and the database registry
//! - [`commands`]: the command table and every data command
//! - [`connection`]: per-client sessions and the socket loop
//! - [`config`]: command line and environment configuration
//! - [`server`]: shared server state and the accept loop
//!
//! ## Expiry
//!
//! Keys with a TTL are removed two ways:
//! 1. **Lazy**: any access to an expired key treats it as missing and drops it
//! 2. **Active**: each shard has a sweep task that periodically scans for expired keys

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandTable;
pub use config::{Config, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionStats, Session};
pub use protocol::{ParseError, RespParser, Value};
pub use server::Server;
pub use storage::{Database, DatabaseRegistry, ExpiryConfig};

/// Version of RapidKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
