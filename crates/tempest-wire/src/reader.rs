use crate::decimal::Decimal;
use crate::date::WireDate;
use crate::error::{WireError, WireResult};
use crate::varint;

/// A cursor over a borrowed byte slice, mirroring every [`crate::writer::FrameWriter`]
/// operation. Any read that would overrun the slice fails with
/// [`WireError::MalformedFrame`] rather than panicking.
#[derive(Debug, Clone, Copy)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Wraps `buf` with the cursor at position zero.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining between the cursor and the end of the slice.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::MalformedFrame("read past end of buffer"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> WireResult<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> WireResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> WireResult<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> WireResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> WireResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> WireResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_single(&mut self) -> WireResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_double(&mut self) -> WireResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_decimal(&mut self) -> WireResult<Decimal> {
        Ok(Decimal::from_parts(
            self.read_u32()?,
            self.read_u32()?,
            self.read_u32()?,
            self.read_u32()?,
        ))
    }

    pub fn read_date(&mut self) -> WireResult<WireDate> {
        Ok(WireDate::from_ticks(self.read_i64()?))
    }

    /// Reads a 7-bit variable-length encoded non-negative count.
    pub fn read_var_u32(&mut self) -> WireResult<u32> {
        varint::read_u32(self.buf, &mut self.pos)
    }

    /// Reads a nullable UTF-8 string written by [`crate::writer::FrameWriter::write_string`].
    pub fn read_string(&mut self) -> WireResult<Option<String>> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let len = self.read_var_u32()? as usize;
        let bytes = self.take(len)?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| WireError::MalformedFrame("string is not valid UTF-8"))?;
        Ok(Some(text.to_string()))
    }

    /// Reads a non-nullable byte slice written by [`crate::writer::FrameWriter::write_bytes`].
    pub fn read_bytes(&mut self) -> WireResult<Vec<u8>> {
        let len = self.read_var_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads exactly `n` raw bytes with no length prefix.
    pub fn read_raw(&mut self, n: usize) -> WireResult<&'a [u8]> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FrameWriter;

    #[test]
    fn primitives_round_trip() {
        let mut w = FrameWriter::new();
        w.write_bool(true);
        w.write_u32(0xdead_beef);
        w.write_i64(-42);
        w.write_double(std::f64::consts::PI);
        w.write_bytes(&[1, 2, 3]);
        let bytes = w.flush();

        let mut r = FrameReader::new(&bytes);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_double().unwrap(), std::f64::consts::PI);
        assert_eq!(r.read_bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn overrunning_length_prefix_is_malformed() {
        let mut w = FrameWriter::new();
        w.write_var_u32(100);
        w.write_raw(b"short");
        let bytes = w.flush();
        let mut r = FrameReader::new(&bytes);
        assert!(matches!(
            r.read_bytes(),
            Err(WireError::MalformedFrame(_))
        ));
    }
}
