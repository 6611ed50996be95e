//! Partial-message fragmentation and reassembly (spec.md §4.D, §9: fragment
//! ordering is fixed strictly-ordered — a gap or duplicate disconnects the
//! connection rather than attempting out-of-order buffering).

use dashmap::DashMap;
use tempest_crypto::{HMAC_TAG_LEN, IV_LEN};

use crate::error::{FrameError, FrameResult};

/// Overhead, in bytes, a `Partial` frame's own fixed-size fields add on
/// top of its `bytes` payload (`original_message_id` + `fragment_index` +
/// `is_last` + the `bytes` field's length prefix): this is the *inner*
/// payload overhead only, before `encode_frame` wraps it in a wire frame.
pub const PARTIAL_FIELD_OVERHEAD: usize = 4 + 4 + 1 + 5;

/// Fixed-size header fields written ahead of the `iv` field: `protocol_id`
/// (1) + `flags` (1) + `connection_id` (4) + `message_type` (2) +
/// `total_length` (4).
const HEADER_FIXED_FIELDS: usize = 1 + 1 + 4 + 2 + 4;

/// `iv`'s own length prefix (`u16`) plus the IV bytes. `Partial` frames are
/// always `encrypted` post-handshake, so this field is always present.
const IV_FIELD: usize = 2 + IV_LEN;

/// The trailing signature's length prefix (`u16`) plus an HMAC-SHA256 tag.
/// `Partial` frames are always `authenticated` post-handshake and signed
/// with the session key, never the (longer) RSA signature used during the
/// handshake, so the HMAC tag length is exact, not just an upper bound.
const SIGNATURE_FIELD: usize = 2 + HMAC_TAG_LEN;

/// Worst-case PKCS#7 padding added by CBC encryption: one AES block (the
/// scheme always adds between 1 and `block_size` bytes).
const MAX_CBC_PADDING: usize = IV_LEN;

/// Total overhead, in bytes, that `encode_frame` adds on top of a
/// `Partial`'s `bytes` chunk once its own inner fields
/// ([`PARTIAL_FIELD_OVERHEAD`]) are accounted for: the wire header up to
/// and including `message_id` (`Partial` is never a response, so
/// `response_message_id` is never written), the IV field, worst-case CBC
/// padding, and the trailing HMAC signature field. Sizing fragment chunks
/// against this (rather than [`PARTIAL_FIELD_OVERHEAD`] alone) is what
/// keeps an *encoded* `Partial` frame within `max_message_length`.
pub const FRAGMENT_FRAME_OVERHEAD: usize =
    HEADER_FIXED_FIELDS + IV_FIELD + 4 /* message_id */ + SIGNATURE_FIELD + MAX_CBC_PADDING + PARTIAL_FIELD_OVERHEAD;

/// Splits `bytes` into chunks no larger than `max_chunk_len`, returning
/// `(fragment_index, is_last, chunk)` triples in order.
#[must_use]
pub fn split_into_fragments(bytes: &[u8], max_chunk_len: usize) -> Vec<(u32, bool, Vec<u8>)> {
    debug_assert!(max_chunk_len > 0);
    if bytes.is_empty() {
        return vec![(0, true, Vec::new())];
    }
    let chunks: Vec<&[u8]> = bytes.chunks(max_chunk_len).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| (index as u32, index == last, chunk.to_vec()))
        .collect()
}

struct PendingReassembly {
    next_index: u32,
    buffer: Vec<u8>,
}

/// Reassembles `Partial` fragments back into the original frame's raw
/// bytes, keyed by `(connection_id, original_message_id)` (spec.md §4.D).
#[derive(Default)]
pub struct FragmentReassembler {
    pending: DashMap<(u32, u32), PendingReassembly>,
}

impl FragmentReassembler {
    /// Creates an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Accepts one fragment. Returns `Ok(Some(bytes))` once the final
    /// fragment completes the sequence, `Ok(None)` while more are still
    /// expected, and `Err(FrameError::OutOfOrderFragment)` if `index` is
    /// not the next one this key expects.
    pub fn accept(
        &self,
        connection_id: u32,
        original_message_id: u32,
        index: u32,
        is_last: bool,
        bytes: &[u8],
    ) -> FrameResult<Option<Vec<u8>>> {
        let key = (connection_id, original_message_id);
        let mut entry = self
            .pending
            .entry(key)
            .or_insert_with(|| PendingReassembly {
                next_index: 0,
                buffer: Vec::new(),
            });

        if entry.next_index != index {
            let expected = entry.next_index;
            drop(entry);
            self.pending.remove(&key);
            return Err(FrameError::OutOfOrderFragment { expected, got: index });
        }

        entry.buffer.extend_from_slice(bytes);
        entry.next_index += 1;

        if is_last {
            drop(entry);
            let (_, finished) = self.pending.remove(&key).expect("entry was just inserted");
            Ok(Some(finished.buffer))
        } else {
            Ok(None)
        }
    }

    /// Number of reassemblies currently in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_reassembles_in_order() {
        let original = (0u8..=250).collect::<Vec<u8>>();
        let fragments = split_into_fragments(&original, 64);
        assert!(fragments.len() > 1);

        let reassembler = FragmentReassembler::new();
        let mut result = None;
        for (index, is_last, chunk) in &fragments {
            result = reassembler.accept(1, 99, *index, *is_last, chunk).unwrap();
        }
        assert_eq!(result, Some(original));
    }

    #[test]
    fn out_of_order_fragment_is_rejected() {
        let reassembler = FragmentReassembler::new();
        reassembler.accept(1, 99, 0, false, b"a").unwrap();
        let err = reassembler.accept(1, 99, 2, false, b"c").unwrap_err();
        assert!(matches!(err, FrameError::OutOfOrderFragment { expected: 1, got: 2 }));
    }

    #[test]
    fn empty_payload_reassembles_to_empty_single_fragment() {
        let fragments = split_into_fragments(&[], 64);
        assert_eq!(fragments, vec![(0, true, Vec::new())]);
        let reassembler = FragmentReassembler::new();
        let result = reassembler.accept(1, 1, 0, true, &[]).unwrap();
        assert_eq!(result, Some(Vec::new()));
    }
}
