use crate::decimal::Decimal;
use crate::date::WireDate;
use crate::varint;

/// A growable byte-buffer writer for the Tempest value codec.
///
/// All multi-byte integers are little-endian. Writes never fail: the
/// backing buffer grows as needed, matching the "write fails atomically or
/// not at all" invariant from the codec's round-trip law — there is simply
/// no partial-write path to hit.
#[derive(Debug, Default, Clone)]
pub struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a writer with pre-reserved capacity, reusing a pooled buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// The logical write cursor, i.e. the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finalizes the buffer for transmission, handing ownership to the
    /// caller (the frame codec backpatches the length field in place before
    /// calling this).
    #[must_use]
    pub fn flush(self) -> Vec<u8> {
        self.buf
    }

    /// Borrows the buffer written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Borrows the buffer mutably, for in-place backpatching of
    /// fixed-width fields (e.g. the frame header's `total_length`).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_single(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_decimal(&mut self, value: Decimal) {
        self.write_u32(value.lo);
        self.write_u32(value.mid);
        self.write_u32(value.hi);
        self.write_u32(value.flags);
    }

    pub fn write_date(&mut self, value: WireDate) {
        self.write_i64(value.ticks());
    }

    /// Writes a 7-bit variable-length encoded non-negative count.
    pub fn write_var_u32(&mut self, value: u32) {
        varint::write_u32(&mut self.buf, value);
    }

    /// Writes a nullable UTF-8 string: one bool prefix, then (if present) a
    /// variable-length byte count followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.write_bool(false),
            Some(text) => {
                self.write_bool(true);
                let bytes = text.as_bytes();
                self.write_var_u32(bytes.len() as u32);
                self.buf.extend_from_slice(bytes);
            }
        }
    }

    /// Writes a non-nullable byte slice: variable-length count then bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_var_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes raw bytes with no length prefix (used for payload splicing in
    /// the frame codec, where the length lives in the header instead).
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::FrameReader;

    #[test]
    fn string_round_trips_through_reader() {
        let mut w = FrameWriter::new();
        w.write_string(Some("hello"));
        w.write_string(None);
        let bytes = w.flush();
        let mut r = FrameReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), Some("hello".to_string()));
        assert_eq!(r.read_string().unwrap(), None);
    }
}
