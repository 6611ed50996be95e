use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Message;

/// A protocol's id byte. `0` is reserved and never registered; `1` is the
/// internal control protocol; applications use `[2, 255]` (spec.md §6).
pub type ProtocolId = u8;

/// Constructs a freshly-default message instance for a registered
/// message-type code; the frame codec then populates it via
/// [`Message::read_payload`].
pub type MessageFactory = fn() -> Box<dyn Message>;

/// The `(id, version)` pair exchanged during the handshake (spec.md §4.E
/// #1, #2): what a `Connect`/`AcknowledgeConnect` frame actually lists, as
/// opposed to a full [`Protocol`] with its factory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolDescriptor {
    /// The protocol id.
    pub id: ProtocolId,
    /// The protocol version.
    pub version: u32,
}

/// A namespaced set of message-type codes with an id, a version, and an
/// optional set of versions this registration is wire-compatible with
/// (spec.md §3). Created once by the application and registered
/// process-wide via [`crate::Protocols::register`]; immutable thereafter.
pub struct Protocol {
    id: ProtocolId,
    version: u32,
    compatible: BTreeSet<u32>,
    factories: BTreeMap<u16, MessageFactory>,
}

impl Protocol {
    /// Starts a new protocol with no compatible versions and no message
    /// types registered yet.
    #[must_use]
    pub fn new(id: ProtocolId, version: u32) -> Self {
        Self {
            id,
            version,
            compatible: BTreeSet::new(),
            factories: BTreeMap::new(),
        }
    }

    /// Declares `versions` as wire-compatible with this registration (in
    /// addition to an exact `version` match).
    #[must_use]
    pub fn with_compatible_versions(mut self, versions: impl IntoIterator<Item = u32>) -> Self {
        self.compatible.extend(versions);
        self
    }

    /// Registers a message-type code's factory. Panics-free: a duplicate
    /// code silently overwrites, matching a `BTreeMap`'s insert semantics
    /// (the source material does the same for a duplicate registration).
    #[must_use]
    pub fn register(mut self, code: u16, factory: MessageFactory) -> Self {
        self.factories.insert(code, factory);
        self
    }

    /// Registers several `(code, factory)` pairs at once.
    #[must_use]
    pub fn register_all(mut self, entries: impl IntoIterator<Item = (u16, MessageFactory)>) -> Self {
        self.factories.extend(entries);
        self
    }

    /// The protocol id.
    #[must_use]
    pub const fn id(&self) -> ProtocolId {
        self.id
    }

    /// The protocol version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// This protocol's `(id, version)` descriptor, as advertised in
    /// `Connect`/`AcknowledgeConnect`.
    #[must_use]
    pub const fn descriptor(&self) -> ProtocolDescriptor {
        ProtocolDescriptor {
            id: self.id,
            version: self.version,
        }
    }

    /// Whether `other` names the same protocol id and is wire-compatible:
    /// same version, or `other.version` is in this registration's
    /// compatible set (spec.md §3).
    #[must_use]
    pub fn compatible_with(&self, other: &ProtocolDescriptor) -> bool {
        self.id == other.id && (self.version == other.version || self.compatible.contains(&other.version))
    }

    /// Invokes the factory registered for `code`.
    pub fn create(&self, code: u16) -> ProtocolResult<Box<dyn Message>> {
        let factory = self
            .factories
            .get(&code)
            .ok_or(ProtocolError::UnknownMessageType {
                protocol_id: self.id,
                code,
            })?;
        Ok(factory())
    }

    /// Whether a factory is registered for `code`.
    #[must_use]
    pub fn supports(&self, code: u16) -> bool {
        self.factories.contains_key(&code)
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl Eq for Protocol {}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("compatible", &self.compatible)
            .field("message_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_id_and_version_only() {
        let a = Protocol::new(2, 1);
        let b = Protocol::new(2, 1).with_compatible_versions([9]);
        assert_eq!(a, b);
        let c = Protocol::new(2, 2);
        assert_ne!(a, c);
    }

    #[test]
    fn compatible_with_checks_id_and_version_set() {
        let proto = Protocol::new(2, 3).with_compatible_versions([1, 2]);
        assert!(proto.compatible_with(&ProtocolDescriptor { id: 2, version: 3 }));
        assert!(proto.compatible_with(&ProtocolDescriptor { id: 2, version: 1 }));
        assert!(!proto.compatible_with(&ProtocolDescriptor { id: 2, version: 4 }));
        assert!(!proto.compatible_with(&ProtocolDescriptor { id: 5, version: 3 }));
    }
}
