//! # Overview
//!
//! `tempest-types` implements the polymorphic object serializer (spec.md
//! §4.B) on top of `tempest-wire`'s value codec: the per-connection
//! [`TypeMap`], the [`Serializable`]/[`Deserializable`] traits concrete
//! message-payload types implement, the [`PolyValue`] trait object used for
//! fields whose static type is a trait rather than a struct, and the
//! [`SerializeContext`] threaded through every call.
//!
//! # Design
//!
//! Reflection-driven member enumeration (spec.md §9) has no Rust analogue,
//! so field order is fixed at compile time instead: either by a hand-written
//! [`Serializable`] impl, or by `#[derive(Serializable)]` from
//! `tempest-types-derive`, which expands to the same explicit field-by-field
//! writes in declaration order.
//!
//! Polymorphism is id-only: a `u16` resolved through [`TypeMap`], never a
//! type name, matching spec.md §4.B's constraint.

mod context;
mod error;
mod serialize;
mod type_map;

pub use context::{Deserializable, PolyValue, SerializeContext, Serializable};
pub use error::{SerializeError, SerializeResult};
pub use serialize::{
    read_array, read_concrete, read_polymorphic, write_array, write_concrete, write_polymorphic,
};
pub use type_map::TypeMap;

#[cfg(feature = "derive")]
pub use tempest_types_derive::Serializable;

