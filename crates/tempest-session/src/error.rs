use tempest_core::DisconnectReason;
use tempest_crypto::CryptoError;
use tempest_frame::FrameError;
use thiserror::Error;

/// Failures raised while driving the handshake state machine (spec.md §4.E).
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A message arrived that the current handshake phase did not expect.
    #[error("unexpected {got} message while in the {phase} phase")]
    UnexpectedMessage {
        /// The phase the handshake was in.
        phase: &'static str,
        /// What arrived instead.
        got: &'static str,
    },
    /// The server's (or client's) advertised hash algorithm name was not
    /// one this build supports.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHash(String),
    /// A signature failed to verify during the handshake.
    #[error("handshake signature verification failed")]
    SignatureVerificationFailed,
    /// The protocol intersection between client and server was empty.
    #[error("no compatible protocol between client and server")]
    IncompatibleVersion,
    /// Decrypting the AES session key (or encrypting/decoding a public key)
    /// failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// A lower layer failed: frame encode/decode.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The handshake did not complete within `handshake_timeout_ms`.
    #[error("handshake timed out")]
    TimedOut,
    /// The peer sent a plaintext `Disconnect` during the handshake instead
    /// of the next expected message (spec.md §4.E's failure semantics:
    /// "the server sends `Disconnect(reason)` and closes").
    #[error("peer closed the handshake: {0:?}")]
    PeerDisconnected(DisconnectReason),
    /// The underlying socket failed while a handshake message was being
    /// sent or received.
    #[error("transport I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    /// Maps a handshake failure to the wire [`DisconnectReason`] the caller
    /// should close the connection with (spec.md §4.E's failure semantics).
    #[must_use]
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::IncompatibleVersion => DisconnectReason::IncompatibleVersion,
            Self::Crypto(_) => DisconnectReason::EncryptionMismatch,
            Self::TimedOut => DisconnectReason::TimedOut,
            Self::UnexpectedMessage { .. } | Self::UnsupportedHash(_) | Self::SignatureVerificationFailed => {
                DisconnectReason::FailedHandshake
            }
            Self::Frame(frame_err) => frame_err.disconnect_reason(),
            Self::Io(_) => DisconnectReason::ConnectionFailed,
            Self::PeerDisconnected(reason) => reason.clone(),
        }
    }
}

/// Failures raised by the running session engine after the handshake
/// completes (spec.md §4.F, §7).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A lower layer failed: frame encode/decode.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The connection was already disconnected.
    #[error("connection already disconnected")]
    AlreadyDisconnected,
    /// `send_for` timed out waiting for a response.
    #[error("response timed out")]
    TimedOut,
    /// `send_for`'s response slot was cancelled before a response arrived.
    #[error("response cancelled")]
    Cancelled,
    /// `require_encryption` is set and a message that is not both encrypted
    /// and authenticated was handed to `send`/`send_for` (spec.md §6).
    #[error("message must be encrypted and authenticated by this connection's policy")]
    EncryptionRequired,
}

/// Result alias for fallible session-engine operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result alias for fallible handshake steps.
pub type HandshakeResult<T> = Result<T, HandshakeError>;
