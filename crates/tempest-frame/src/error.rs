use tempest_core::DisconnectReason;
use tempest_crypto::CryptoError;
use tempest_protocol::ProtocolError;
use tempest_types::SerializeError;
use tempest_wire::WireError;
use thiserror::Error;

/// Failures raised by the frame codec (spec.md §4.D, §7).
#[derive(Debug, Error)]
pub enum FrameError {
    /// A header field failed to parse, or the wire layout was otherwise
    /// malformed (short signature, truncated IV length, ...).
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    /// A frame's `total_length` exceeded the configured
    /// `max_message_length`.
    #[error("message of {actual} bytes exceeds max_message_length of {max} bytes")]
    MessageTooLarge {
        /// The offending `total_length`.
        actual: u32,
        /// The configured cap.
        max: u32,
    },
    /// A `Partial` fragment's index did not match the reassembler's
    /// "next expected" counter (spec.md §4.D, §9: strictly-ordered
    /// fragments only).
    #[error("out-of-order fragment: expected index {expected}, got {got}")]
    OutOfOrderFragment {
        /// The index the reassembler was waiting for.
        expected: u32,
        /// The index the fragment actually carried.
        got: u32,
    },
    /// A frame claimed `encrypted` or `authenticated` but no
    /// [`tempest_crypto::SessionCrypto`] has been installed on this codec
    /// (i.e. received before the handshake derived a session key).
    #[error("no session key established for an encrypted/authenticated frame")]
    NoSessionCrypto,
    /// A post-handshake frame's signature or HMAC tag failed verification.
    #[error("message authentication failed")]
    MessageAuthenticationFailed,
    /// `require_encryption` is set and a post-handshake frame lacked the
    /// encrypted or authenticated flag.
    #[error("encryption mismatch")]
    EncryptionMismatch,
    /// A lower layer failed: wire primitives.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// A lower layer failed: the protocol/message registry.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A lower layer failed: the object serializer.
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// A lower layer failed: symmetric/asymmetric crypto.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result alias used throughout the frame codec.
pub type FrameResult<T> = Result<T, FrameError>;

impl FrameError {
    /// Maps a frame-level failure to the wire [`DisconnectReason`] the
    /// session engine should tear the connection down with (spec.md §4.D,
    /// §7).
    #[must_use]
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::MessageAuthenticationFailed => DisconnectReason::MessageAuthenticationFailed,
            Self::EncryptionMismatch | Self::NoSessionCrypto => DisconnectReason::EncryptionMismatch,
            Self::Malformed(_)
            | Self::MessageTooLarge { .. }
            | Self::OutOfOrderFragment { .. }
            | Self::Wire(_)
            | Self::Protocol(_)
            | Self::Serialize(_)
            | Self::Crypto(_) => DisconnectReason::FailedUnknown,
        }
    }
}
