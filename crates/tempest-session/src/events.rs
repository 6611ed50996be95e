//! The one event a [`crate::Connection`] emits once it is done: everything
//! that happens while the connection is alive (a message arriving) goes
//! through the [`crate::handlers::MessageHandler`] registry instead, but
//! teardown is asynchronous relative to the call that triggered it, so it
//! needs a channel of its own.

use tempest_core::DisconnectReason;

/// Emitted exactly once per connection, after every task has wound down and
/// every pending response has been cancelled (spec.md §4.F). The facade
/// crates (`tempest-client`, `tempest-server`) translate this into their
/// own public `Disconnected` event.
#[derive(Debug, Clone)]
pub struct Disconnected {
    /// Whether the local side initiated the teardown (as opposed to the
    /// peer closing first or a transport failure).
    pub requested: bool,
    /// Why the connection ended.
    pub reason: DisconnectReason,
}
