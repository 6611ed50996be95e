use std::any::Any;

use tempest_types::{SerializeContext, SerializeResult};
use tempest_wire::{FrameReader, FrameWriter};

use crate::header::Header;

/// The three on-wire flag bits a frame's flags byte carries (spec.md
/// §4.D): whether the payload is AES-encrypted, whether a trailing HMAC/RSA
/// signature is present, and whether this frame is a response to an
/// earlier message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags(u8);

impl MessageFlags {
    const ENCRYPTED_BIT: u8 = 0b001;
    const AUTHENTICATED_BIT: u8 = 0b010;
    const IS_RESPONSE_BIT: u8 = 0b100;

    /// Builds a flags byte from its three booleans.
    #[must_use]
    pub const fn new(encrypted: bool, authenticated: bool, is_response: bool) -> Self {
        let mut bits = 0u8;
        if encrypted {
            bits |= Self::ENCRYPTED_BIT;
        }
        if authenticated {
            bits |= Self::AUTHENTICATED_BIT;
        }
        if is_response {
            bits |= Self::IS_RESPONSE_BIT;
        }
        Self(bits)
    }

    /// Reconstructs flags from the raw wire byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw wire byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the payload is AES-256-CBC encrypted.
    #[must_use]
    pub const fn encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED_BIT != 0
    }

    /// Whether a trailing signature (HMAC or RSA) is present.
    #[must_use]
    pub const fn authenticated(self) -> bool {
        self.0 & Self::AUTHENTICATED_BIT != 0
    }

    /// Whether this frame is a response to an earlier message.
    #[must_use]
    pub const fn is_response(self) -> bool {
        self.0 & Self::IS_RESPONSE_BIT != 0
    }
}

/// An application or internal datum exchanged on a connection (spec.md
/// §3). Concrete payload types implement `write_payload`/`read_payload`
/// (forwarded, in the common case, to a `#[derive(Serializable)]` impl from
/// `tempest-types`) and override the defaulted predicate methods as needed —
/// handshake messages override `authenticated`, session-encrypted ones
/// override `encrypted`.
///
/// Instances start out constructed by a zero-argument [`crate::MessageFactory`]
/// and are then populated in place by [`Message::read_payload`], mirroring
/// how the frame codec first resolves a message's concrete type from the
/// header before reading its body.
pub trait Message: Any + Send + Sync {
    /// The id of the protocol this message belongs to.
    fn protocol_id(&self) -> u8;

    /// The message-type code, unique within `protocol_id()`.
    fn message_type(&self) -> u16;

    /// The header the engine populates (connection id, message id,
    /// response linkage, wire length).
    fn header(&self) -> &Header;

    /// Mutable access to the header, for the engine to populate.
    fn header_mut(&mut self) -> &mut Header;

    /// Whether this message requires a reliable (TCP-backed) transport.
    /// Always `true` in this core — unreliable delivery is a declared
    /// non-goal (spec.md §1) — kept as a predicate for forward
    /// compatibility with the source's API shape.
    fn must_be_reliable(&self) -> bool {
        true
    }

    /// Whether the sender prefers but does not require reliable delivery.
    fn prefer_reliable(&self) -> bool {
        true
    }

    /// Whether this message may be accepted before a connection-id has
    /// been assigned (connectionless delivery is unsupported; always
    /// `false` in practice).
    fn accepted_connectionlessly(&self) -> bool {
        false
    }

    /// Whether this message must carry a signature. Handshake messages
    /// override this to `true`.
    fn authenticated(&self) -> bool {
        false
    }

    /// Whether this message's payload must be AES-encrypted. Every
    /// non-handshake frame is `true` under `require_encryption` (spec.md
    /// §6), enforced by the frame codec rather than per-message here.
    fn encrypted(&self) -> bool {
        false
    }

    /// Writes the payload body (not the frame header) using the
    /// connection's [`SerializeContext`].
    fn write_payload(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()>;

    /// Reads the payload body into this (freshly-constructed, default)
    /// instance.
    fn read_payload(
        &mut self,
        ctx: &SerializeContext,
        reader: &mut FrameReader<'_>,
    ) -> SerializeResult<()>;

    /// Type-erased downcast target, so application handlers can recover
    /// the concrete message type after dispatch.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast target.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
