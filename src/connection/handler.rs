//! Connection Handler
//!
//! Each client gets its own handler task that runs in a loop, decoding
//! requests, running them through its [`Session`] and writing replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned with a fresh Session
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode every complete   │ │
//!    │  │ frame in the buffer     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Session::execute, write │ │
//!    │  │ reply into BufWriter    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush once, then read   │ │
//!    │  │ (or stop on shutdown)   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT, disconnect, error or server shutdown
//! ```
//!
//! ## Buffer Management
//!
//! A BytesMut buffer accumulates incoming data. TCP is a stream protocol, so
//! one read may hold half a frame or a whole pipeline of them. Replies for
//! every complete frame are written before a single flush.
//!
//! A frame that fails to decode is answered with an error reply and the
//! buffer is advanced past the next CRLF; the connection stays open.

use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::commands::CommandError;
use crate::connection::session::Session;
use crate::protocol::parser::{MAX_BULK_SIZE, MAX_INLINE_SIZE};
use crate::protocol::{skip_line, ParseError, RespParser, Value};
use crate::server::Server;

/// Maximum size for the read buffer: one maximal bulk payload plus its
/// surrounding headers. The parser rejects larger declared lengths and
/// overlong lines before the buffer gets here.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + MAX_INLINE_SIZE;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Upper bound on a single growth step of the read buffer
const MAX_RESERVE: usize = 1024 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Incoming bytes not yet decoded
    buffer: BytesMut,

    /// Encoded reply, reused between requests
    reply: Vec<u8>,

    /// Bytes written to `stream` since the last flush
    unflushed: usize,

    parser: RespParser,
    session: Session,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) -> Self {
        let stats = Arc::clone(server.stats());
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            reply: Vec::new(),
            unflushed: 0,
            parser: RespParser::new(),
            shutdown: server.subscribe_shutdown(),
            session: Session::new(server),
            stats,
        }
    }

    /// Runs the connection until the client leaves or the server stops.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        if *self.shutdown.borrow_and_update() {
            return Ok(());
        }

        loop {
            while let Some(frame) = self.next_frame() {
                let reply = match frame {
                    Ok(request) => {
                        self.stats.command_processed();
                        self.session.execute(request)
                    }
                    Err(e) => CommandError::Protocol(e).into(),
                };
                self.write_reply(&reply).await?;

                if self.session.is_closing() {
                    self.flush().await?;
                    return Ok(());
                }
            }

            self.flush().await?;

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Decodes the next complete frame from the buffer.
    ///
    /// Returns `None` when more data is needed. A decode error consumes the
    /// offending line.
    fn next_frame(&mut self) -> Option<Result<Value, ParseError>> {
        if self.buffer.is_empty() {
            return None;
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Some(Ok(value))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                None
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                let skip = skip_line(&self.buffer);
                self.buffer.advance(skip);
                Some(Err(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `Ok(false)` when the server is shutting down.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            // Doubling keeps large frames from being read 4 KB at a time
            let grow = self.buffer.len().clamp(INITIAL_BUFFER_SIZE, MAX_RESERVE);
            self.buffer.reserve(grow);
        }

        let n = tokio::select! {
            read = self.stream.get_mut().read_buf(&mut self.buffer) => read?,
            _ = self.shutdown.changed() => {
                debug!(client = %self.addr, "Closing connection for shutdown");
                return Ok(false);
            }
        };

        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Encodes a reply into the write buffer without flushing.
    async fn write_reply(&mut self, reply: &Value) -> Result<(), ConnectionError> {
        self.reply.clear();
        reply.serialize_into(&mut self.reply);
        self.stream.write_all(&self.reply).await?;
        self.unflushed += self.reply.len();
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        if self.unflushed == 0 {
            return Ok(());
        }
        self.stream.flush().await?;
        self.stats.bytes_written(self.unflushed);
        trace!(client = %self.addr, bytes = self.unflushed, "Sent responses");
        self.unflushed = 0;
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Creates a [`ConnectionHandler`] for an accepted socket and runs it to
/// completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) {
    let handler = ConnectionHandler::new(stream, addr, server);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
