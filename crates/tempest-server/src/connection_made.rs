//! The event a [`crate::Server`] raises once a connection finishes its
//! handshake (spec.md §4.G).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempest_session::Connection;

/// Raised once per accepted connection, after the handshake completes
/// (spec.md §4.G). The application's handler may call
/// [`ConnectionMade::reject`] to have the server close the connection
/// immediately instead of leaving it live.
pub struct ConnectionMade {
    /// The newly-authenticated connection.
    pub connection: Connection,
    rejected: Arc<AtomicBool>,
}

impl ConnectionMade {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            rejected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks this connection for immediate closure once the handler
    /// returns (spec.md §4.G: "applications may mark the event as
    /// rejected to cause the server to close immediately").
    pub fn reject(&self) {
        self.rejected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_rejected(&self) -> bool {
        self.rejected.load(Ordering::SeqCst)
    }
}
