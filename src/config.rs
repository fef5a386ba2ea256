//! Server configuration, read from the command line and the environment.

use clap::Parser;
use std::time::Duration;

use crate::storage::{
    ExpiryConfig, DEFAULT_DATABASES, DEFAULT_SHARD_COUNT, DEFAULT_SWEEP_INTERVAL,
};

/// The default port RapidKV listens on
pub const DEFAULT_PORT: u16 = 18018;

/// The default host RapidKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Upper bound on shards per database
pub const MAX_SHARDS: usize = 1024;

/// Upper bound on the number of databases
pub const MAX_DATABASES: usize = 1024;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rapidkv",
    version,
    about = "in-memory key-value server speaking the Redis protocol"
)]
pub struct Config {
    /// address to bind to
    #[arg(long, env = "RAPIDKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// port to listen on
    #[arg(short, long, env = "RAPIDKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// require clients to AUTH with this password before running commands
    #[arg(long, env = "RAPIDKV_REQUIREPASS")]
    pub requirepass: Option<String>,

    /// shards per database, clamped to 1..=1024
    #[arg(long, env = "RAPIDKV_SHARDS", default_value_t = DEFAULT_SHARD_COUNT)]
    pub shards: usize,

    /// number of databases; SELECT and MOVE accept indices 0..databases
    #[arg(long, env = "RAPIDKV_DATABASES", default_value_t = DEFAULT_DATABASES)]
    pub databases: usize,

    /// milliseconds between two expiry sweeps of the same shard
    #[arg(
        long,
        env = "RAPIDKV_SWEEP_INTERVAL_MS",
        default_value_t = DEFAULT_SWEEP_INTERVAL.as_millis() as u64
    )]
    pub sweep_interval_ms: u64,

    /// log filter used when RUST_LOG is not set (e.g. "info", "rapidkv=debug")
    #[arg(long, env = "RAPIDKV_LOG", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            requirepass: None,
            shards: DEFAULT_SHARD_COUNT,
            databases: DEFAULT_DATABASES,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.clamp(1, MAX_SHARDS)
    }

    /// Number of databases, clamped to `1..=MAX_DATABASES`.
    pub fn database_count(&self) -> usize {
        self.databases.clamp(1, MAX_DATABASES)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: Duration::from_millis(self.sweep_interval_ms.max(1)),
        }
    }

    /// The configured password; an empty string disables authentication.
    pub fn password(&self) -> Option<&str> {
        self.requirepass.as_deref().filter(|p| !p.is_empty())
    }
}
