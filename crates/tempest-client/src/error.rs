use tempest_core::DisconnectReason;
use tempest_session::HandshakeError;
use thiserror::Error;

/// Why [`crate::Client::connect`] failed (spec.md §6's `ConnectionResult`).
#[derive(Debug, Error)]
pub enum ConnectError {
    /// DNS resolution or the initial TCP connect failed.
    #[error("connecting to the target failed: {0}")]
    Io(#[from] std::io::Error),
    /// The handshake itself failed once the socket was open.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

impl ConnectError {
    /// The [`DisconnectReason`] this failure would have surfaced as, had
    /// the connection gotten far enough to disconnect instead of never
    /// connecting.
    #[must_use]
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::Io(_) => DisconnectReason::ConnectionFailed,
            Self::Handshake(err) => err.disconnect_reason(),
        }
    }
}
