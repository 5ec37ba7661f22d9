use crate::Result;

// Modified UTF-8 decoding. Strings in a dex file are prefixed with their
// length in UTF-16 code units, so decoding is driven by that count and never
// by a terminating zero byte.

/// Decodes the next character from a MUTF-8 stream. `next` yields the bytes
/// that follow the leading byte `one`. The result holds a single UTF-16 code
/// unit in its low half, or a surrogate pair for four-byte sequences (trail
/// unit in the high half).
#[inline]
pub fn utf16_from_mutf8<F>(one: u8, mut next: F) -> Result<u32>
where
    F: FnMut() -> Result<u8>,
{
    if one & 0x80 == 0 {
        return Ok(one as u32);
    }

    let two = next()?;
    if one & 0x20 == 0 {
        return Ok(((one & 0x1f) as u32) << 6 | (two & 0x3F) as u32);
    }

    let three = next()?;
    if one & 0x10 == 0 {
        return Ok(((one & 0x0f) as u32) << 12 | ((two & 0x3F) as u32) << 6 | (three & 0x3F) as u32);
    }

    let four = next()?;
    let code_point = ((one & 0x0F) as u32) << 18
        | ((two & 0x3F) as u32) << 12
        | ((three & 0x3F) as u32) << 6
        | (four & 0x3F) as u32;

    let mut surrogate_pair: u32 = 0x00;
    surrogate_pair |= ((code_point >> 10) + 0xd7c0) & 0xFFFF;
    surrogate_pair |= ((code_point & 0x03FF) + 0xdc00) << 16;
    Ok(surrogate_pair)
}

#[inline(always)]
pub fn trailing_utf16_char(maybe_pair: u32) -> u16 {
    (maybe_pair >> 16) as u16
}

#[inline(always)]
pub fn leading_utf16_char(maybe_pair: u32) -> u16 {
    (maybe_pair & 0x0000FFFF) as u16
}

/// Decodes `utf16_len` code units from `data`. Returns the code units and the
/// number of bytes consumed.
pub fn mutf8_to_utf16(data: &[u8], utf16_len: usize) -> Result<(Vec<u16>, usize)> {
    let mut pos = 0;
    let mut next = || match data.get(pos) {
        Some(b) => {
            pos += 1;
            Ok(*b)
        }
        None => crate::dex_err!(TruncatedData {
            offset: pos,
            requested: 1,
            available: 0,
        }),
    };

    // every code unit takes at least one byte
    let mut utf16_data_out: Vec<u16> = Vec::with_capacity(utf16_len.min(data.len()));
    while utf16_data_out.len() < utf16_len {
        let one = next()?;
        let ch = utf16_from_mutf8(one, &mut next)?;
        utf16_data_out.push(leading_utf16_char(ch));
        let trailing = trailing_utf16_char(ch);
        // a pair never extends the string past its declared length
        if trailing != 0 && utf16_data_out.len() < utf16_len {
            utf16_data_out.push(trailing);
        }
    }
    Ok((utf16_data_out, pos))
}

pub fn mutf8_to_str_lossy(data: &[u8], utf16_len: usize) -> Result<String> {
    let (utf16_data, _) = mutf8_to_utf16(data, utf16_len)?;
    Ok(String::from_utf16_lossy(&utf16_data))
}
