use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;

use dashmap::DashMap;
use tempest_wire::{FrameReader, FrameWriter};

use crate::error::{SerializeError, SerializeResult};
use crate::type_map::TypeMap;

/// Reads a concrete [`PolyValue`] out of `reader` given only the bytes —
/// registered once per type via [`SerializeContext::register`].
type PolyFactory = Box<dyn Fn(&SerializeContext, &mut FrameReader<'_>) -> SerializeResult<Box<dyn PolyValue>> + Send + Sync>;

/// Object-safe half of [`Serializable`], used for fields whose static type
/// is a trait object (`Box<dyn PolyValue>`) rather than a concrete struct.
/// Blanket-implemented for any `T: Serializable + Any + Send + Sync`.
pub trait PolyValue: Any + Send + Sync {
    /// Writes this value's body (no header — the header is written once by
    /// the polymorphic-field caller, see [`crate::serialize::write_polymorphic`]).
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()>;

    /// Type-erased downcast target.
    fn as_any(&self) -> &dyn Any;

    /// The concrete `TypeId` of this value, used to resolve its TypeMap id.
    fn concrete_type_id(&self) -> TypeId;
}

/// Values that can appear standalone (primitives, enums-as-integers,
/// strings, dates, decimals) or as the concrete type behind a polymorphic
/// field. User types implement this directly or via `#[derive(Serializable)]`
/// (see `tempest-types-derive`).
pub trait Serializable: 'static {
    /// Writes the value's body, excluding any polymorphic header.
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()>;
}

/// The read half of [`Serializable`].
pub trait Deserializable: Serializable + Sized {
    /// Reads a value's body, excluding any polymorphic header.
    fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self>;
}

impl<T> PolyValue for T
where
    T: Serializable + Any + Send + Sync,
{
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        Serializable::write_body(self, ctx, writer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn concrete_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

/// Per-connection state threaded through every (de)serialize call: the
/// [`TypeMap`] for polymorphic headers, the factory registry used to
/// reconstruct a concrete type from an id on read, and the cycle-detection
/// visit set for the current call tree.
pub struct SerializeContext {
    type_map: TypeMap,
    factories: DashMap<TypeId, PolyFactory>,
    visiting: RefCell<HashSet<usize>>,
}

impl Default for SerializeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializeContext {
    /// Creates a fresh context with an empty `TypeMap`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            type_map: TypeMap::new(),
            factories: DashMap::new(),
            visiting: RefCell::new(HashSet::new()),
        }
    }

    /// Exposes the underlying [`TypeMap`], e.g. for the frame codec to drain
    /// newly-seen types at flush time.
    #[must_use]
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Registers `T` as a candidate concrete type for polymorphic fields.
    /// Both peers must register the same set of types in the same order
    /// before exchanging polymorphic payloads, so their `TypeMap`s agree on
    /// ids (mirrors how `Protocol::register` fixes message-type ids ahead of
    /// time).
    pub fn register<T: Deserializable + PolyValue>(&self) {
        let type_id = TypeId::of::<T>();
        self.type_map.get_type_id::<T>();
        self.factories.insert(
            type_id,
            Box::new(|ctx, reader| Ok(Box::new(T::read_body(ctx, reader)?) as Box<dyn PolyValue>)),
        );
    }

    pub(crate) fn with_factory<R>(
        &self,
        type_id: TypeId,
        f: impl FnOnce(&PolyFactory) -> R,
    ) -> Option<R> {
        self.factories.get(&type_id).map(|entry| f(entry.value()))
    }

    pub(crate) fn type_id_for_poly_id(&self, id: u16) -> SerializeResult<TypeId> {
        self.type_map
            .type_for_id(id)
            .ok_or(SerializeError::UnknownTypeId(id))
    }

    pub(crate) fn poly_id_for(&self, type_id: TypeId) -> u16 {
        // Registration always happens ahead of serialization via `register`,
        // so this never assigns a fresh id from inside a write call; it
        // mirrors `get_type_id` for symmetry with the TypeMap's own API.
        let (_, id) = self.type_map.get_type_id_by_type_id(type_id);
        id
    }

    pub(crate) fn enter(&self, addr: usize) -> SerializeResult<()> {
        if !self.visiting.borrow_mut().insert(addr) {
            return Err(SerializeError::UnsupportedGraph);
        }
        Ok(())
    }

    pub(crate) fn exit(&self, addr: usize) {
        self.visiting.borrow_mut().remove(&addr);
    }
}
