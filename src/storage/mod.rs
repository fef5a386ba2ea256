//! Storage Engine Module
//!
//! This module provides the in-memory key space of the server: sharded
//! databases with per-key expiry, the background sweepers and the registry
//! of numbered databases.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │       DatabaseRegistry       │
//!                 │   0 ──> Database   ...  N    │
//!                 └──────────────┬───────────────┘
//!                                │
//! ┌──────────────────────────────▼──────────────────────────────┐
//! │                          Database                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌─────────┐     │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │  ...   │ Shard N │     │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │        │ RwLock  │     │
//! │  └────▲────┘ └────▲────┘ └────▲────┘        └────▲────┘     │
//! └───────┼───────────┼───────────┼──────────────────┼──────────┘
//!         │           │           │                  │
//!      sweep 0     sweep 1     sweep 2   ...      sweep N
//!                (one Tokio task per shard)
//! ```
//!
//! ## Example
//!
//! ```
//! use rapidkv::protocol::Value;
//! use rapidkv::storage::{Database, SetMode};
//! use bytes::Bytes;
//!
//! let db = Database::new(0, 8);
//!
//! db.set(Bytes::from("name"), Value::bulk_string("Ariz"), SetMode::Any, 0);
//! assert_eq!(db.get(b"name"), Some(Value::bulk_string("Ariz")));
//!
//! // Increment in place
//! let counter = Bytes::from("hits");
//! db.mutate(&counter, true, |element| {
//!     let current = element.value.as_integer().unwrap_or(0);
//!     element.value = Value::integer(current + 1);
//!     ((), true)
//! });
//! assert_eq!(db.get(b"hits"), Some(Value::integer(1)));
//! ```

pub mod engine;
pub mod expiry;
pub mod glob;
pub mod registry;

// Re-export commonly used types
pub use engine::{
    now_millis, Database, Element, RenameOutcome, SetMode, DEFAULT_SHARD_COUNT,
};
pub use expiry::{ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use glob::{GlobPattern, PatternError};
pub use registry::{DatabaseRegistry, DEFAULT_DATABASES};
