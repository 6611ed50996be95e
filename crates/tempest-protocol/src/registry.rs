use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::control;
use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{Protocol, ProtocolDescriptor, ProtocolId};
use crate::CONTROL_PROTOCOL_ID;

/// Process-wide `protocol_id -> Protocol` registry a frame parser consults
/// to find the owning protocol for an incoming header (spec.md §4.C).
/// Seeded on first access with the internal control protocol, so
/// `Protocols::get(1)` always resolves regardless of what the application
/// has registered — mirroring spec.md §9's "model as initialized-once
/// registries accessed via shared, concurrent maps" redesign note.
pub struct Protocols;

static REGISTRY: OnceLock<DashMap<ProtocolId, Arc<Protocol>>> = OnceLock::new();

impl Protocols {
    fn map() -> &'static DashMap<ProtocolId, Arc<Protocol>> {
        REGISTRY.get_or_init(|| {
            let map = DashMap::new();
            map.insert(CONTROL_PROTOCOL_ID, Arc::new(control::build()));
            map
        })
    }

    /// Registers `protocol` process-wide. Fails if `protocol.id()` is `0`
    /// (reserved), `1` (the internal control protocol), or already
    /// registered.
    pub fn register(protocol: Protocol) -> ProtocolResult<Arc<Protocol>> {
        let id = protocol.id();
        if id == 0 || id == CONTROL_PROTOCOL_ID {
            return Err(ProtocolError::ReservedProtocolId(id));
        }
        let map = Self::map();
        if map.contains_key(&id) {
            return Err(ProtocolError::AlreadyRegistered(id));
        }
        let arc = Arc::new(protocol);
        map.insert(id, arc.clone());
        Ok(arc)
    }

    /// Looks up a registered protocol by id (including the control
    /// protocol at id `1`).
    #[must_use]
    pub fn get(id: ProtocolId) -> Option<Arc<Protocol>> {
        Self::map().get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolves `id` or fails with [`ProtocolError::UnknownProtocol`].
    pub fn require(id: ProtocolId) -> ProtocolResult<Arc<Protocol>> {
        Self::get(id).ok_or(ProtocolError::UnknownProtocol(id))
    }

    /// Intersects a client's advertised protocol list against everything
    /// registered process-wide, keeping only descriptors the server both
    /// knows about and considers version-compatible (spec.md §4.E #2's
    /// `enabled_protocols`). Order follows the client's list.
    #[must_use]
    pub fn negotiate(client_offered: &[ProtocolDescriptor]) -> Vec<ProtocolDescriptor> {
        client_offered
            .iter()
            .filter(|descriptor| {
                Self::get(descriptor.id).is_some_and(|p| p.compatible_with(descriptor))
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_protocol_is_always_present() {
        let control = Protocols::require(CONTROL_PROTOCOL_ID).unwrap();
        assert_eq!(control.id(), CONTROL_PROTOCOL_ID);
    }

    #[test]
    fn reserved_ids_cannot_be_registered() {
        assert_eq!(
            Protocols::register(Protocol::new(0, 1)),
            Err(ProtocolError::ReservedProtocolId(0))
        );
        assert_eq!(
            Protocols::register(Protocol::new(CONTROL_PROTOCOL_ID, 1)),
            Err(ProtocolError::ReservedProtocolId(CONTROL_PROTOCOL_ID))
        );
    }

    #[test]
    fn negotiate_filters_by_compatibility() {
        // Uses an id unlikely to collide with other tests running in the
        // same process (the registry is global and OnceLock-backed).
        let id = 200;
        if Protocols::get(id).is_none() {
            Protocols::register(Protocol::new(id, 1).with_compatible_versions([0])).unwrap();
        }
        let offered = vec![
            ProtocolDescriptor { id, version: 1 },
            ProtocolDescriptor { id, version: 99 },
            ProtocolDescriptor { id: 250, version: 1 },
        ];
        let enabled = Protocols::negotiate(&offered);
        assert_eq!(enabled, vec![ProtocolDescriptor { id, version: 1 }]);
    }
}
