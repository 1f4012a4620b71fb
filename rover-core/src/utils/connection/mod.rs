//! Module Exports
//!
//! This file exports the network transports that submit rover commands.
//!
//! # Modules
//! - `server`: HTTP routes and the WebSocket command channel.

/// Module for the HTTP server, including the `/rover` endpoint and the
/// `/ws` command socket.
pub mod server;
