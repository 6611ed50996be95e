use thiserror::Error;

use crate::protocol::ProtocolId;

/// Failures raised by the protocol/message registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame's `protocol_id` byte named a protocol nothing registered.
    #[error("unknown protocol id {0}")]
    UnknownProtocol(ProtocolId),
    /// A frame's `message_type` named a code with no registered factory.
    #[error("unknown message type {code} for protocol {protocol_id}")]
    UnknownMessageType {
        /// The protocol the lookup was scoped to.
        protocol_id: ProtocolId,
        /// The unrecognized message-type code.
        code: u16,
    },
    /// Protocol id `0` is reserved and may never be registered (spec.md
    /// §3); id `1` is reserved for the internal control protocol and may
    /// not be registered by an application (spec.md §4.C).
    #[error("protocol id {0} is reserved")]
    ReservedProtocolId(ProtocolId),
    /// A protocol with this id was already registered in the process-wide
    /// registry.
    #[error("protocol id {0} is already registered")]
    AlreadyRegistered(ProtocolId),
}

/// Result alias used throughout the protocol/message registry.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
