use crate::message::MessageFlags;

/// The fixed-shape prefix of every frame, sufficient for routing and
/// dispatch without the payload (spec.md §3). Populated three ways: a
/// freshly-constructed outgoing message gets a zeroed header that the
/// session engine fills in (`message_id`, `connection_id`) before the frame
/// codec writes it; an incoming frame is parsed field-by-field by
/// `tempest_frame`'s incremental header parser, which resumes across
/// partial reads and produces one of these once complete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// The protocol this frame belongs to.
    pub protocol_id: u8,
    /// The connection this frame was sent/received on, assigned by the
    /// server during the handshake.
    pub connection_id: u32,
    /// The message-type code, unique within `protocol_id`.
    pub message_type: u16,
    /// Total frame length in bytes, including this header.
    pub length: u32,
    /// The AES-CBC initialization vector, present iff `flags.encrypted()`.
    pub iv: Option<Vec<u8>>,
    /// Monotonic per-sender id, wraps at 2^31 (spec.md §3).
    pub message_id: u32,
    /// The encrypted/authenticated/is-response bits from the wire.
    pub flags: MessageFlags,
    /// The `message_id` this frame responds to, present iff
    /// `flags.is_response()`.
    pub response_message_id: Option<u32>,
}

impl Header {
    /// Builds a header for a freshly-constructed outgoing message, with
    /// `message_id` and `connection_id` left at zero for the engine to
    /// populate before sending.
    #[must_use]
    pub fn new(protocol_id: u8, message_type: u16) -> Self {
        Self {
            protocol_id,
            message_type,
            ..Self::default()
        }
    }

    /// Whether this frame is a response to an earlier message.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        self.flags.is_response()
    }
}
