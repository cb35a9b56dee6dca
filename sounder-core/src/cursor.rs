//! Bounds-checked sequential reader over a single record's bytes.
//!
//! Every multi-byte field in both capture formats is little-endian, so the
//! cursor only offers little-endian accessors. Reads past the end of the
//! buffer return an error instead of panicking; decoders translate that
//! into a per-record diagnostic.

use thiserror::Error;

/// Attempted read past the end of the record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read of {wanted} bytes at offset {at} overruns record of {len} bytes")]
pub struct Overrun {
    pub at: usize,
    pub wanted: usize,
    pub len: usize,
}

/// Sequential little-endian reader over one record.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteCursor { buf, pos: 0 }
    }

    /// Current offset from the start of the record.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the record.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Jump to an absolute offset. The offset may be one past the end
    /// (an empty tail), like slice indexing.
    pub fn seek(&mut self, pos: usize) -> Result<(), Overrun> {
        if pos > self.buf.len() {
            return Err(Overrun {
                at: self.pos,
                wanted: pos - self.pos,
                len: self.buf.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<(), Overrun> {
        self.take(n).map(|_| ())
    }

    /// Borrow the next `n` bytes and advance.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Overrun> {
        self.take(n)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Overrun> {
        if self.remaining() < n {
            return Err(Overrun {
                at: self.pos,
                wanted: n,
                len: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, Overrun> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, Overrun> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn u16(&mut self) -> Result<u16, Overrun> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn i16(&mut self) -> Result<i16, Overrun> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32, Overrun> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn i32(&mut self) -> Result<i32, Overrun> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, Overrun> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn f32(&mut self) -> Result<f32, Overrun> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn f64(&mut self) -> Result<f64, Overrun> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Four-byte record tag, as used by the modern datagram headers.
    pub fn tag4(&mut self) -> Result<[u8; 4], Overrun> {
        Ok(self.take(4)?.try_into().unwrap())
    }
}
