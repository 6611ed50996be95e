//! # Overview
//!
//! `tempest-client` is spec.md §4.G's client half: [`Client::connect`]
//! resolves a [`Target`], opens a TCP connection, and drives the client
//! handshake, returning a [`Client`] that forwards `send`/`send_for`/
//! `register_handler`/`disconnect` straight through to the underlying
//! [`tempest_session::Connection`].
//!
//! Nothing here re-implements the session engine — this crate's entire job
//! is resolving an address and owning the `TcpStream` the handshake runs
//! over, the way the teacher's `cli` crate is a thin front door over its
//! `core`/`engine` crates rather than a second copy of their logic.

mod client;
mod error;
mod target;

pub use client::Client;
pub use error::ConnectError;
pub use target::Target;

pub use tempest_session::{Connection, Disconnected, MessageHandler, SessionHandle};
