//! # Overview
//!
//! `tempest-session` is spec.md §4.E and §4.F: the [`handshake`] state
//! machines that turn a raw stream into an authenticated [`Connection`],
//! and the connection itself — the send queue, receive dispatch loop,
//! [`response::ResponseManager`] correlator, keepalive, and graceful/
//! immediate teardown that make up the running session engine.
//!
//! # Design
//!
//! [`connection::connect_client`]/[`connection::accept_server`] are the
//! only two entry points; both drive a handshake state machine to
//! completion over the raw stream, then hand the authenticated connection
//! off to an internal `spawn_connection` that starts the writer, reader,
//! dispatcher, keepalive, and response-sweep tasks described in spec.md
//! §4.F and §5. `tempest-client`/`tempest-server` build on top of these two
//! functions; nothing here owns a `TcpListener` or resolves a hostname.

mod connection;
pub mod error;
mod events;
pub mod handlers;
pub mod handshake;
mod response;

pub use connection::{accept_server, connect_client, Connection};
pub use error::{HandshakeError, HandshakeResult, SessionError, SessionResult};
pub use events::Disconnected;
pub use handlers::{HandlerRegistry, MessageHandler, SessionHandle};
pub use response::{ResponseManager, ResponseOutcome};
