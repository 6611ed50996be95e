//! # Overview
//!
//! `tempest-frame` turns a [`tempest_protocol::Message`] into wire bytes and
//! back: the resumable [`header_parser::HeaderParser`], the reusable
//! [`pool::BufferPool`] encoding draws from, the [`fragment`] split/reassemble
//! scheme for oversize messages, and [`codec::FrameCodec`] itself, which owns
//! a connection's decode state and drives encryption/signing through
//! [`codec::Signer`].
//!
//! # Design
//!
//! `FrameCodec` implements `tokio_util::codec::Decoder` directly, so
//! `tempest-session` can wrap a connection's half in a `Framed` and pull
//! `DecodedFrame`s off it. Encoding is not symmetric: an outgoing frame
//! needs a [`codec::Signer`] alongside the message, which `Encoder`'s
//! single-item signature has no room for, so `encode_frame` stays a plain
//! method instead. One codec, and the `SerializeContext` it owns, belongs to
//! exactly one connection — nothing here is shared across connections,
//! matching how the reusable buffer pool is the only resource actually meant
//! to be contended.

mod codec;
mod error;
mod fragment;
mod header_parser;
pub mod pool;

pub use codec::{DecodedFrame, FrameCodec, Signer};
pub use error::{FrameError, FrameResult};
pub use fragment::{split_into_fragments, FragmentReassembler, FRAGMENT_FRAME_OVERHEAD, PARTIAL_FIELD_OVERHEAD};
pub use header_parser::{write_header, HeaderParser, HeaderState, ParseOutcome};
pub use pool::BufferPool;
