//! The disconnect reason code carried on the wire (spec.md §6) and surfaced
//! through every `Disconnected` event.

use thiserror::Error;

/// Why a connection was torn down. The numeric values are the wire
/// encoding (a `u8`) and must not be renumbered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    /// An unspecified local failure: malformed frame, oversize message, or
    /// any other condition that does not have a more specific reason.
    #[error("connection failed for an unspecified reason")]
    FailedUnknown,
    /// Graceful shutdown requested by either side.
    #[error("connection closed successfully")]
    Success,
    /// The initial TCP connect attempt failed.
    #[error("TCP connect failed")]
    ConnectionFailed,
    /// The client and server protocol sets had no compatible intersection.
    #[error("no compatible protocol version")]
    IncompatibleVersion,
    /// A signature or decryption failure occurred during the handshake.
    #[error("handshake failed")]
    FailedHandshake,
    /// A post-handshake frame's HMAC did not verify.
    #[error("message authentication failed")]
    MessageAuthenticationFailed,
    /// AES decryption failed, or a frame required encryption but lacked it.
    #[error("encryption mismatch")]
    EncryptionMismatch,
    /// Application-supplied reason, carried as a UTF-8 string.
    #[error("{0}")]
    Custom(String),
    /// A deadline (handshake, keepalive, or `send_for`) elapsed.
    #[error("timed out")]
    TimedOut,
}

impl DisconnectReason {
    /// The wire discriminant for this reason (spec.md §6's `u8` enum).
    #[must_use]
    pub const fn wire_code(&self) -> u8 {
        match self {
            Self::FailedUnknown => 0,
            Self::Success => 1,
            Self::ConnectionFailed => 2,
            Self::IncompatibleVersion => 3,
            Self::FailedHandshake => 4,
            Self::MessageAuthenticationFailed => 5,
            Self::EncryptionMismatch => 6,
            Self::Custom(_) => 7,
            Self::TimedOut => 8,
        }
    }

    /// Reconstructs a reason from its wire code and (for `Custom`) an
    /// accompanying string.
    #[must_use]
    pub fn from_wire(code: u8, custom: Option<String>) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::ConnectionFailed,
            3 => Self::IncompatibleVersion,
            4 => Self::FailedHandshake,
            5 => Self::MessageAuthenticationFailed,
            6 => Self::EncryptionMismatch,
            7 => Self::Custom(custom.unwrap_or_default()),
            8 => Self::TimedOut,
            _ => Self::FailedUnknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_match_spec_table() {
        assert_eq!(DisconnectReason::FailedUnknown.wire_code(), 0);
        assert_eq!(DisconnectReason::Success.wire_code(), 1);
        assert_eq!(DisconnectReason::TimedOut.wire_code(), 8);
        assert_eq!(DisconnectReason::Custom("oops".into()).wire_code(), 7);
    }

    #[test]
    fn custom_round_trips_through_wire_code() {
        let reason = DisconnectReason::Custom("bye".into());
        let restored = DisconnectReason::from_wire(reason.wire_code(), Some("bye".into()));
        assert_eq!(reason, restored);
    }
}
