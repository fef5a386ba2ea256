//! RapidKV server entry point.
//!
//! Reads the configuration, sets up logging, binds the listener and serves
//! clients until Ctrl+C.

use clap::Parser;
use rapidkv::{Config, Server};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
   ____             _     _ _  ____     __
  |  _ \ __ _ _ __ (_) __| | |/ /\ \   / /
  | |_) / _` | '_ \| |/ _` | ' /  \ \ / /
  |  _ < (_| | |_) | | (_| | . \   \ V /
  |_| \_\__,_| .__/|_|\__,_|_|\_\   \_/
             |_|

RapidKV v{} - sharded in-memory key-value server
──────────────────────────────────────────────────────────────
Listening on {} ({} shards per database{})
Use Ctrl+C to shut down.
"#,
        rapidkv::VERSION,
        config.bind_address(),
        config.shard_count(),
        if config.password().is_some() { ", AUTH required" } else { "" },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let server = Arc::new(Server::new(config));
    let listener = server.bind().await?;

    print_banner(server.config());
    info!(
        shards = server.databases().shard_count(),
        databases = server.databases().limit(),
        sweep_interval_ms = server.config().sweep_interval_ms,
        "Server initialized"
    );

    let serving = tokio::spawn(Arc::clone(&server).serve(listener));

    match signal::ctrl_c().await {
        Ok(()) => {}
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
    server.shutdown();

    serving.await??;
    info!("Server shutdown complete");
    Ok(())
}
