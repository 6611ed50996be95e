//! # Overview
//!
//! `tempest-protocol` is spec.md §4.C: the [`Protocol`] type (an id,
//! version, compatible-version set, and a message-type-code → factory
//! table), the process-wide [`Protocols`] registry frame parsing looks up
//! the owning protocol in, the [`Message`] trait concrete payload types
//! implement, and the [`Header`] every frame carries.
//!
//! The internal control protocol (id `1`: `Ping`, `Pong`, `Disconnect`,
//! `Connect`, `AcknowledgeConnect`, `FinalConnect`, `Connected`,
//! `Acknowledge`, `Partial`) lives in [`control`].
//!
//! # Design
//!
//! `Protocols` is a `OnceLock<DashMap<u8, Arc<Protocol>>>`, the same
//! initialized-once-registry shape the teacher repo's `core::branding`
//! module uses for its process-wide singletons (spec.md §9's "model as
//! initialized-once registries" redesign note for the source's global
//! mutable state).

pub mod control;
mod error;
mod header;
mod message;
mod protocol;
mod registry;

pub use error::{ProtocolError, ProtocolResult};
pub use header::Header;
pub use message::{Message, MessageFlags};
pub use protocol::{MessageFactory, Protocol, ProtocolDescriptor, ProtocolId};
pub use registry::Protocols;

/// The internal control protocol's reserved id (spec.md §4.C, §6).
pub const CONTROL_PROTOCOL_ID: ProtocolId = 1;

/// The first id an application protocol may use (spec.md §6: `[2, 255]`).
pub const FIRST_APPLICATION_PROTOCOL_ID: ProtocolId = 2;
