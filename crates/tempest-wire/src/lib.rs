//! # Overview
//!
//! `tempest-wire` is the leaf of the Tempest workspace: primitive binary
//! read/write over a growable byte buffer. Every other crate in the
//! workspace builds on [`FrameWriter`]/[`FrameReader`] — the object
//! serializer in `tempest-types` recurses through them field by field, and
//! the frame codec in `tempest-frame` uses them to write and parse headers.
//!
//! # Invariants
//!
//! Reading any sequence previously written through [`FrameWriter`] with
//! [`FrameReader`] yields identical values (the codec's round-trip law,
//! exercised in this crate's property tests for every primitive). All
//! multi-byte integers are little-endian; strings are UTF-8.

mod date;
mod decimal;
mod error;
mod reader;
mod varint;
mod writer;

pub use date::{WireDate, TICKS_TO_UNIX_EPOCH};
pub use decimal::Decimal;
pub use error::{WireError, WireResult};
pub use reader::FrameReader;
pub use writer::FrameWriter;
