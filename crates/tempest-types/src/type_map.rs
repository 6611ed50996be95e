use std::any::TypeId;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

/// A per-connection bidirectional mapping between concrete runtime types and
/// compact `u16` ids, used to encode polymorphic fields without ever putting
/// a type name on the wire (spec.md §4.B's "strictly by the TypeMap" rule).
///
/// Ids are assigned monotonically from zero in first-use order. The map is
/// append-only: once assigned, an id is never reused or reassigned. New
/// assignments accumulate in a staging list until [`TypeMap::drain_new_types`]
/// is called, which the frame codec does once per outgoing flush so the peer
/// learns about newly-seen types before any payload referencing them.
#[derive(Debug, Default)]
pub struct TypeMap {
    forward: DashMap<TypeId, u16>,
    reverse: DashMap<u16, TypeId>,
    next_id: AtomicU16,
    staging: Mutex<Vec<(TypeId, u16)>>,
}

impl TypeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up (assigning if necessary) the id for `T`. Returns `(is_new,
    /// id)`: `is_new` is `true` only the first time a given type is seen.
    pub fn get_type_id<T: 'static>(&self) -> (bool, u16) {
        self.get_type_id_by_type_id(TypeId::of::<T>())
    }

    /// Non-generic variant of [`TypeMap::get_type_id`], used when the caller
    /// only has a type-erased `TypeId` in hand (e.g. resolving a
    /// [`crate::PolyValue`]'s concrete type to its wire id).
    pub fn get_type_id_by_type_id(&self, type_id: TypeId) -> (bool, u16) {
        if let Some(existing) = self.forward.get(&type_id) {
            return (false, *existing);
        }
        let mut is_new = false;
        let id = *self.forward.entry(type_id).or_insert_with(|| {
            is_new = true;
            self.next_id.fetch_add(1, Ordering::SeqCst)
        });
        if is_new {
            self.reverse.insert(id, type_id);
            self.staging.lock().unwrap().push((type_id, id));
        }
        (is_new, id)
    }

    /// Reverse lookup: the `TypeId` registered under `id`, if any.
    #[must_use]
    pub fn type_for_id(&self, id: u16) -> Option<TypeId> {
        self.reverse.get(&id).map(|entry| *entry)
    }

    /// Drains and returns `(type, id)` pairs added since the last call.
    pub fn drain_new_types(&self) -> Vec<(TypeId, u16)> {
        std::mem::take(&mut self.staging.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StringT;
    struct IntT;

    #[test]
    fn scenario_type_map_basics() {
        let map = TypeMap::new();
        assert_eq!(map.get_type_id::<StringT>(), (true, 0));
        assert_eq!(map.get_type_id::<StringT>(), (false, 0));
        assert_eq!(map.get_type_id::<IntT>(), (true, 1));

        let drained = map.drain_new_types();
        let ids: Vec<u16> = drained.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(map.drain_new_types().is_empty());
    }

    #[test]
    fn reverse_lookup_matches_forward() {
        let map = TypeMap::new();
        let (_, id) = map.get_type_id::<StringT>();
        assert_eq!(map.type_for_id(id), Some(TypeId::of::<StringT>()));
    }
}
