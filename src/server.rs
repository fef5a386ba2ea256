//! Top-level server state and the accept loop.
//!
//! A [`Server`] is built once at startup and shared by every connection
//! task through an `Arc`. It owns everything that used to be process-wide:
//! the configuration, the database registry, the command table, connection
//! statistics and the shutdown signal.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::commands::CommandTable;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::DatabaseRegistry;

#[derive(Debug)]
pub struct Server {
    config: Config,
    databases: DatabaseRegistry,
    commands: CommandTable,
    stats: Arc<ConnectionStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Builds the server state. Database 0 (and its sweep tasks, when called
    /// inside a runtime) exists once this returns.
    pub fn new(config: Config) -> Self {
        let databases = DatabaseRegistry::new(
            config.shard_count(),
            config.database_count(),
            config.expiry(),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            databases,
            commands: CommandTable::new(),
            stats: Arc::new(ConnectionStats::new()),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn databases(&self) -> &DatabaseRegistry {
        &self.databases
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// The password sessions must present, if any.
    pub fn password(&self) -> Option<&str> {
        self.config.password()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signals the accept loop and every connection to stop, and stops the
    /// expiry sweepers. In-flight commands run to completion.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Shutdown signal received, stopping server...");
        self.databases.stop_sweepers();
    }

    /// Binds a listener on the configured address.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let address = self.config.bind_address();
        TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {}", address))
    }

    /// Accepts connections until [`Server::shutdown`] is called.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        let local: SocketAddr = listener.local_addr().context("listener has no address")?;
        info!(address = %local, "Listening");

        let mut shutdown = self.subscribe_shutdown();
        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(stream, addr, Arc::clone(&self)));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        info!(
            accepted = self.stats.connections_accepted.load(Ordering::Relaxed),
            active = self.stats.active_connections.load(Ordering::Relaxed),
            commands = self.stats.commands_processed.load(Ordering::Relaxed),
            bytes_read = self.stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = self.stats.bytes_written.load(Ordering::Relaxed),
            "Accept loop stopped"
        );
        Ok(())
    }
}
