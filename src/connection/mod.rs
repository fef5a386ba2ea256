//! Connection Module
//!
//! Every client connection is handled by its own async task, so the server
//! can serve thousands of concurrent clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Server::serve (accept loop)                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │ Read bytes  │───>│ Decode      │───>│ Session         │  │
//! │  └─────────────┘    └─────────────┘    │ (auth, SELECT,  │  │
//! │                                        │  MULTI/EXEC)    │  │
//! │                                        └────────┬────────┘  │
//! │                                                 ▼           │
//! │                                        ┌─────────────────┐  │
//! │                                        │ Encode + flush  │  │
//! │                                        └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod session;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
pub use session::Session;
