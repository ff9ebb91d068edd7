//! Primitive-level sequential binary I/O.
//!
//! [`ByteWriter`] appends little-endian primitives into a growable
//! in-memory buffer and supports absolute `tell`/`seek`, which the
//! composite codec relies on to back-patch length prefixes mid-stream.
//! [`ByteReader`] is the mirrored bounds-checked view over a byte slice.
//!
//! Wire conventions (little-endian throughout):
//! - flags byte: bit `(7 - i)` holds boolean flag `i`, unused bits 0
//! - string: `[u32 byte-length][UTF-8 bytes]`
//! - big integer: `[u8 sign (1 = negative)][u32 magnitude length][LE magnitude]`

use num_bigint::{BigInt, Sign};

use crate::constants::DEFAULT_GROWTH_INCREMENT;
use crate::error::{RefcodeError, Result};

/// Converts an in-memory length to its `u32` wire form, rejecting sizes
/// the format cannot carry instead of silently truncating them.
pub(crate) fn wire_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        RefcodeError::Internal(format!("length {len} exceeds the u32 wire range"))
    })
}

/// A growable in-memory byte sink with an absolute cursor.
///
/// The backing buffer grows geometrically: when a write does not fit, the
/// buffer is extended by `max(growth_increment, shortfall, capacity / 10)`.
/// Bytes written past earlier positions (after a [`seek`](Self::seek))
/// overwrite in place; [`finish`](Self::finish) truncates the buffer to
/// the high-water mark of written bytes.
#[derive(Debug)]
pub struct ByteWriter {
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    growth: usize,
}

impl ByteWriter {
    /// Creates an empty writer with the default growth increment.
    pub fn new() -> Self {
        Self::with_growth(DEFAULT_GROWTH_INCREMENT)
    }

    /// Creates an empty writer with a custom growth increment.
    pub fn with_growth(growth: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            len: 0,
            growth: growth.max(1),
        }
    }

    fn ensure(&mut self, extra: usize) {
        let needed = self.pos + extra;
        if needed > self.buf.len() {
            let shortfall = needed - self.buf.len();
            let grow = self.growth.max(shortfall).max(self.buf.len() / 10);
            self.buf.resize(self.buf.len() + grow, 0);
        }
    }

    /// Writes a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.ensure(1);
        self.buf[self.pos] = byte;
        self.pos += 1;
        self.len = self.len.max(self.pos);
    }

    /// Packs up to 8 booleans into one byte, MSB-first.
    ///
    /// Flag `i` lands in bit `(7 - i)`; unused bits stay 0.
    pub fn write_flags(&mut self, flags: &[bool]) -> Result<()> {
        if flags.len() > 8 {
            return Err(RefcodeError::Internal(format!(
                "cannot pack {} flags into one byte",
                flags.len()
            )));
        }
        let mut byte = 0u8;
        for (i, flag) in flags.iter().enumerate() {
            if *flag {
                byte |= 1 << (7 - i);
            }
        }
        self.write_byte(byte);
        Ok(())
    }

    /// Writes a `u32` in little-endian order.
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `f64` in little-endian order.
    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a raw byte run.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.len = self.len.max(self.pos);
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// Fails if the string is longer than the `u32` prefix can express.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_u32(wire_len(s.len())?);
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    /// Writes a big integer in sign-magnitude form.
    ///
    /// Fails if the magnitude is longer than the `u32` prefix can express.
    pub fn write_bigint(&mut self, value: &BigInt) -> Result<()> {
        let (sign, magnitude) = value.to_bytes_le();
        self.write_byte(u8::from(sign == Sign::Minus));
        self.write_u32(wire_len(magnitude.len())?);
        self.write_bytes(&magnitude);
        Ok(())
    }

    /// Returns the current cursor position.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Moves the cursor to an absolute position within the written range.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(RefcodeError::Internal(format!(
                "seek to {pos} past written length {}",
                self.len
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Overwrites a `u32` at `pos` without moving the cursor.
    ///
    /// Used to back-patch counts whose value is unknowable until a
    /// traversal completes.
    pub fn patch_u32(&mut self, pos: usize, value: u32) -> Result<()> {
        let end = self.tell();
        self.seek(pos)?;
        self.write_u32(value);
        self.seek(end.max(pos + 4))
    }

    /// Number of bytes written so far (the high-water mark).
    pub fn written_len(&self) -> usize {
        self.len
    }

    /// Consumes the writer, truncating the backing buffer to exactly the
    /// written size.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounds-checked sequential reader over a byte slice.
///
/// Every read validates the remaining length first and fails with
/// [`RefcodeError::Corrupt`] on truncated input.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `buf`, positioned at the start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads a raw byte run of exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or_else(|| RefcodeError::Corrupt("byte run length overflows cursor".into()))?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| RefcodeError::Corrupt("unexpected end of input".into()))?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a flags byte, unpacking all 8 MSB-first boolean slots.
    pub fn read_flags(&mut self) -> Result<[bool; 8]> {
        let byte = self.read_byte()?;
        let mut flags = [false; 8];
        for (i, flag) in flags.iter_mut().enumerate() {
            *flag = (byte >> (7 - i)) & 1 != 0;
        }
        Ok(flags)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| RefcodeError::Internal("u32 slice length mismatch".into()))?;
        Ok(u32::from_le_bytes(arr))
    }

    /// Reads a little-endian `f64`.
    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| RefcodeError::Internal("f64 slice length mismatch".into()))?;
        Ok(f64::from_le_bytes(arr))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| RefcodeError::Corrupt("invalid UTF-8 in string payload".into()))
    }

    /// Reads a sign-magnitude big integer.
    pub fn read_bigint(&mut self) -> Result<BigInt> {
        let negative = self.read_byte()? != 0;
        let len = self.read_u32()? as usize;
        let magnitude = self.read_bytes(len)?;
        let sign = if negative { Sign::Minus } else { Sign::Plus };
        Ok(BigInt::from_bytes_le(sign, magnitude))
    }

    /// Returns the current cursor position.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Moves the cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(RefcodeError::Corrupt(format!(
                "seek to {pos} past input length {}",
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Number of unread bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
