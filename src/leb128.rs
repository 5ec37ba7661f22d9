use std::result;

use varint_simd::{self, VarIntDecodeError};

/// Maximum number of bytes a LEB128 encoded 32-bit value may occupy.
pub const MAX_LEB128_U32_LEN: usize = 5;

#[inline(always)]
pub fn decode_leb128<T: varint_simd::VarIntTarget>(
    data_in: &[u8],
) -> result::Result<(T, usize), VarIntDecodeError> {
    varint_simd::decode::<T>(data_in)
}

/// Decodes a signed LEB128 value. The sign is taken from bit 6 of the last
/// byte that was consumed.
pub fn decode_sleb128(data_in: &[u8]) -> result::Result<(i32, usize), VarIntDecodeError> {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in data_in.iter().enumerate() {
        if count == MAX_LEB128_U32_LEN {
            return Err(VarIntDecodeError::Overflow);
        }

        value |= ((byte & 0x7f) as i32).wrapping_shl(shift);
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && byte & 0x40 != 0 {
                value |= (-1i32).wrapping_shl(shift);
            }
            return Ok((value, count + 1));
        }
    }
    Err(VarIntDecodeError::NotEnoughBytes)
}
