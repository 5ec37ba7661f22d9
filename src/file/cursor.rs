use varint_simd::VarIntDecodeError;

use crate::{dex_err, error::DexError, leb128, utf, Result};

/// Bounds checked little-endian reader over an immutable byte buffer.
///
/// A cursor performs one linear scan. Random access is done by creating
/// additional cursors over the same buffer, which is cheap.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn seek(&mut self, offset: usize) -> Result<usize> {
        if offset > self.data.len() {
            return dex_err!(OutOfBounds {
                offset: offset as i64,
                size: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(self.pos)
    }

    pub fn seek_relative(&mut self, delta: i64) -> Result<usize> {
        let size = self.data.len();
        match (self.pos as i64).checked_add(delta) {
            Some(target) if target >= 0 && target as u64 <= size as u64 => {
                self.pos = target as usize;
                Ok(self.pos)
            }
            target => dex_err!(OutOfBounds {
                offset: target.unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX }),
                size,
            }),
        }
    }

    /// Moves forward to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> Result<usize> {
        let padding = (alignment - self.pos % alignment) % alignment;
        self.seek_relative(padding as i64)
    }

    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return dex_err!(TruncatedData {
                offset: self.pos,
                requested: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);

    pub fn read_u16_array(&mut self, count: usize) -> Result<Vec<u16>> {
        let size = count.checked_mul(2).unwrap_or(usize::MAX);
        let bytes = self.read_bytes(size)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect())
    }

    pub fn read_uleb128(&mut self) -> Result<u32> {
        let start = self.pos;
        if self.remaining() == 0 {
            return self.varint_error(start, VarIntDecodeError::NotEnoughBytes);
        }
        match leb128::decode_leb128::<u32>(&self.data[start..]) {
            Ok((value, size)) => {
                self.pos += size;
                Ok(value)
            }
            Err(err) => self.varint_error(start, err),
        }
    }

    pub fn read_sleb128(&mut self) -> Result<i32> {
        let start = self.pos;
        match leb128::decode_sleb128(&self.data[start..]) {
            Ok((value, size)) => {
                self.pos += size;
                Ok(value)
            }
            Err(err) => self.varint_error(start, err),
        }
    }

    /// Reads a MUTF-8 string of exactly `utf16_len` UTF-16 code units.
    pub fn read_mutf8(&mut self, utf16_len: usize) -> Result<Vec<u16>> {
        let start = self.pos;
        match utf::mutf8_to_utf16(&self.data[start..], utf16_len) {
            Ok((units, consumed)) => {
                self.pos += consumed;
                Ok(units)
            }
            Err(DexError::TruncatedData {
                offset, requested, ..
            }) => dex_err!(TruncatedData {
                offset: start + offset,
                requested,
                available: 0,
            }),
            Err(err) => Err(err),
        }
    }

    fn varint_error<T>(&self, start: usize, err: VarIntDecodeError) -> Result<T> {
        match err {
            VarIntDecodeError::NotEnoughBytes => dex_err!(TruncatedData {
                offset: start,
                requested: (leb128::MAX_LEB128_U32_LEN).min(self.remaining() + 1),
                available: self.remaining(),
            }),
            _ => dex_err!(MalformedVarint {
                offset: start,
                bits: 32
            }),
        }
    }
}
