use log::trace;

use super::{
    ByteCursor, DexItem, DexString, MapItem, Section, StringId, TypeIndex, TypeList,
};
use crate::Result;

/// Reads `section.count` fixed-size records starting at `section.offset`.
pub fn read_section<T: DexItem>(data: &[u8], section: Section) -> Result<Vec<T>> {
    trace!(
        "reading {} {} item(s) at {:#x}",
        section.count,
        T::NAME,
        section.offset
    );
    if section.is_empty() {
        return Ok(Vec::new());
    }
    read_items(data, section.offset as usize, section.count as usize)
}

/// Reads `count` records starting at `offset`.
pub fn read_items<T: DexItem>(data: &[u8], offset: usize, count: usize) -> Result<Vec<T>> {
    let mut cursor = ByteCursor::at(data, offset)?;
    let mut items = Vec::with_capacity(count.min(cursor.remaining() / T::SIZE));
    for _ in 0..count {
        items.push(T::read(&mut cursor)?);
    }
    Ok(items)
}

/// Decodes one `string_data_item`: the UTF-16 length followed by MUTF-8
/// bytes. The length is authoritative, zero bytes inside the data do not
/// end the string.
pub fn read_string_data(data: &[u8], string_id: &StringId) -> Result<DexString> {
    let mut cursor = ByteCursor::at(data, string_id.offset())?;
    let utf16_size = cursor.read_uleb128()?;
    let units = cursor.read_mutf8(utf16_size as usize)?;
    Ok(DexString {
        offset: string_id.string_data_off,
        utf16_size,
        value: String::from_utf16_lossy(&units),
    })
}

pub fn read_strings(data: &[u8], string_ids: &[StringId]) -> Result<Vec<DexString>> {
    string_ids
        .iter()
        .map(|string_id| read_string_data(data, string_id))
        .collect()
}

/// Reads a `type_list`: a u32 count followed by u16 type indices.
pub fn read_type_list(data: &[u8], offset: u32) -> Result<TypeList> {
    let mut cursor = ByteCursor::at(data, offset as usize)?;
    let size = cursor.read_u32()? as usize;
    let entries = cursor.read_u16_array(size)?;
    Ok(entries.into_iter().map(|idx| idx as TypeIndex).collect())
}

/// Reads the map list at `map_off`. Items of unknown type are kept.
pub fn read_map_list(data: &[u8], map_off: u32) -> Result<Vec<MapItem>> {
    let mut cursor = ByteCursor::at(data, map_off as usize)?;
    let count = cursor.read_u32()? as usize;
    read_items(data, cursor.position(), count)
}
