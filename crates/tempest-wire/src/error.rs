use thiserror::Error;

/// Failures raised by the value codec.
///
/// `BufferOverflow` only fires for the fixed-capacity backpatch helpers used
/// by the frame codec (see `tempest-frame`); the growable writer used
/// everywhere else never runs out of room.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A write targeting a fixed-size buffer region did not fit.
    #[error("buffer overflow: needed {needed} bytes, {available} available")]
    BufferOverflow {
        /// Bytes the write required.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// A read ran past the end of the buffer, or a length prefix described a
    /// value larger than the remaining bytes.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
}

/// Result alias used throughout the value codec.
pub type WireResult<T> = Result<T, WireError>;
