//! Bounds-checked reader over a resident byte buffer.
//!
//! Every read either succeeds and advances, or fails with `TruncatedInput`
//! and leaves the position untouched.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Width of a length or count prefix on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthWidth {
    #[default]
    U16,
    U32,
}

impl LengthWidth {
    /// Number of bytes the prefix occupies.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            LengthWidth::U16 => 2,
            LengthWidth::U32 => 4,
        }
    }

    /// Largest value the prefix can carry.
    #[inline]
    pub fn max_value(self) -> usize {
        match self {
            LengthWidth::U16 => u16::MAX as usize,
            LengthWidth::U32 => u32::MAX as usize,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Absolute offset of `buf[0]`, used for error reporting.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    /// A cursor whose reported offsets start at `base`.
    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::short(self.offset(), n, self.remaining()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> CodecResult<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Split off the next `n` bytes as an independent cursor and advance past them.
    pub fn sub_cursor(&mut self, n: usize) -> CodecResult<Cursor<'a>> {
        let base = self.offset();
        let buf = self.read_bytes(n)?;
        Ok(Cursor::with_base(buf, base))
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> CodecResult<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i128(&mut self) -> CodecResult<i128> {
        Ok(i128::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a length or count prefix of the given width.
    pub fn read_length(&mut self, width: LengthWidth) -> CodecResult<usize> {
        match width {
            LengthWidth::U16 => self.read_u16().map(usize::from),
            LengthWidth::U32 => self.read_u32().map(|v| v as usize),
        }
    }

    /// Read a `u16` length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        match self.read_bytes(len) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Truncation;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x2A, 0x00, 0x00, 0x00, 0x01, 0x02];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.read_i32().unwrap(), 42);
        assert_eq!(cur.read_u16().unwrap(), 0x0201);
        assert!(cur.is_empty());
    }

    #[test]
    fn test_short_read_fails_closed() {
        let data = [0x01, 0x02, 0x03];
        let mut cur = Cursor::with_base(&data, 100);
        cur.skip(1).unwrap();

        let err = cur.read_u32().unwrap_err();
        assert_eq!(
            err,
            CodecError::TruncatedInput {
                offset: 101,
                column: None,
                kind: Truncation::Short {
                    needed: 4,
                    available: 2
                },
            }
        );
        // Position is unchanged after a failed read
        assert_eq!(cur.position(), 1);
    }

    #[test]
    fn test_var_bytes_overrun_restores_position() {
        // Declares 5 bytes but only 2 follow
        let data = [0x05, 0x00, b'a', b'b'];
        let mut cur = Cursor::new(&data);
        assert!(cur.read_var_bytes().is_err());
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn test_sub_cursor_offsets() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let mut cur = Cursor::new(&data);
        cur.skip(2).unwrap();
        let mut sub = cur.sub_cursor(3).unwrap();
        assert_eq!(sub.offset(), 2);
        assert_eq!(sub.read_u8().unwrap(), 2);
        assert_eq!(sub.remaining(), 2);
        assert_eq!(cur.offset(), 5);
    }

    #[test]
    fn test_read_length_widths() {
        let data = [0x10, 0x00, 0x00, 0x01, 0x00, 0x00];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.read_length(LengthWidth::U16).unwrap(), 16);
        assert_eq!(cur.read_length(LengthWidth::U32).unwrap(), 256);
    }
}
