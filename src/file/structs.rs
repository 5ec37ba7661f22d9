use std::sync::Arc;

use serde::Serialize;

use crate::Result;

use super::ByteCursor;

pub type StringIndex = u32;
pub type TypeIndex = u32;
pub type ProtoIndex = u32;
pub type FieldIndex = u32;
pub type MethodIndex = u32;

/// Marks an absent index in fields that may refer to nothing.
pub const NO_INDEX: u32 = 0xffff_ffff;

/// A fixed-size record of one of the id tables.
pub trait DexItem: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;
    const NAME: &'static str;

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self>;
}

#[inline]
fn non_zero(value: u32) -> Option<u32> {
    match value {
        0 => None,
        v => Some(v),
    }
}

#[inline]
fn some_index(value: u32) -> Option<u32> {
    match value {
        NO_INDEX => None,
        v => Some(v),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringId {
    pub string_data_off: u32,
}

impl StringId {
    #[inline]
    pub const fn offset(&self) -> usize {
        self.string_data_off as usize
    }
}

impl DexItem for StringId {
    const SIZE: usize = 4;
    const NAME: &'static str = "StringId";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            string_data_off: cursor.read_u32()?,
        })
    }
}

/// A decoded entry of the string pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DexString {
    /// offset of the string data item
    pub offset: u32,
    /// declared length in UTF-16 code units
    pub utf16_size: u32,
    pub value: String,
}

impl AsRef<str> for DexString {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeId {
    pub descriptor_idx: StringIndex,
}

impl DexItem for TypeId {
    const SIZE: usize = 4;
    const NAME: &'static str = "TypeId";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            descriptor_idx: cursor.read_u32()?,
        })
    }
}

/// Decoded `type_list`. Records pointing at the same list share it.
pub type TypeList = Arc<[TypeIndex]>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtoId {
    pub shorty_idx: StringIndex,      // index into string_ids array for shorty descriptor
    pub return_type_idx: TypeIndex,   // index into type_ids array for return type
    pub parameters_off: Option<u32>,  // file offset to type_list for parameter types
    pub parameters: TypeList,
}

impl DexItem for ProtoId {
    const SIZE: usize = 12;
    const NAME: &'static str = "ProtoId";

    /// Reads the fixed part. The parameter list is resolved by the table
    /// decoder.
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            shorty_idx: cursor.read_u32()?,
            return_type_idx: cursor.read_u32()?,
            parameters_off: non_zero(cursor.read_u32()?),
            parameters: TypeList::from(Vec::new()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub type_idx: TypeIndex,   // index into type_ids_ array for field type
    pub name_idx: StringIndex, // index into string_ids_ array for field name
}

impl DexItem for FieldId {
    const SIZE: usize = 8;
    const NAME: &'static str = "FieldId";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            class_idx: cursor.read_u16()? as TypeIndex,
            type_idx: cursor.read_u16()? as TypeIndex,
            name_idx: cursor.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub proto_idx: ProtoIndex, // index into proto_ids_ array for method signature
    pub name_idx: StringIndex, // index into string_ids_ array for method name
}

impl DexItem for MethodId {
    const SIZE: usize = 8;
    const NAME: &'static str = "MethodId";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            class_idx: cursor.read_u16()? as TypeIndex,
            proto_idx: cursor.read_u16()? as ProtoIndex,
            name_idx: cursor.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDef {
    pub class_idx: TypeIndex, // index into type_ids_ array for this class
    pub access_flags: u32,
    pub superclass_idx: Option<TypeIndex>, // index into type_ids_ array for superclass
    pub interfaces_off: Option<u32>,       // file offset to TypeList
    pub source_file_idx: Option<StringIndex>, // index into string_ids_ for source file name
    pub annotations_off: Option<u32>,      // file offset to annotations_directory_item
    pub class_data_off: Option<u32>,       // file offset to class_data_item
    pub static_values_off: Option<u32>,    // file offset to EncodedArray
    pub interfaces: TypeList,
}

impl DexItem for ClassDef {
    const SIZE: usize = 32;
    const NAME: &'static str = "ClassDef";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            class_idx: cursor.read_u32()?,
            access_flags: cursor.read_u32()?,
            superclass_idx: some_index(cursor.read_u32()?),
            interfaces_off: non_zero(cursor.read_u32()?),
            source_file_idx: some_index(cursor.read_u32()?),
            annotations_off: non_zero(cursor.read_u32()?),
            class_data_off: non_zero(cursor.read_u32()?),
            static_values_off: non_zero(cursor.read_u32()?),
            interfaces: TypeList::from(Vec::new()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapItem {
    pub type_: u16,
    pub size: u32,
    pub off: u32,
}

impl MapItem {
    /// Known item type, `None` for types this crate does not know about.
    pub fn kind(&self) -> Option<MapItemType> {
        MapItemType::from_raw(self.type_)
    }
}

impl DexItem for MapItem {
    const SIZE: usize = 12;
    const NAME: &'static str = "MapItem";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let type_ = cursor.read_u16()?;
        let _unused = cursor.read_u16()?;
        Ok(Self {
            type_,
            size: cursor.read_u32()?,
            off: cursor.read_u32()?,
        })
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapItemType {
    HeaderItem = 0x0000,
    StringIdItem = 0x0001,
    TypeIdItem = 0x0002,
    ProtoIdItem = 0x0003,
    FieldIdItem = 0x0004,
    MethodIdItem = 0x0005,
    ClassDefItem = 0x0006,
    CallSiteIdItem = 0x0007,
    MethodHandleItem = 0x0008,
    MapList = 0x1000,
    TypeList = 0x1001,
    AnnotationSetRefList = 0x1002,
    AnnotationSetItem = 0x1003,
    ClassDataItem = 0x2000,
    CodeItem = 0x2001,
    StringDataItem = 0x2002,
    DebugInfoItem = 0x2003,
    AnnotationItem = 0x2004,
    EncodedArrayItem = 0x2005,
    AnnotationsDirectoryItem = 0x2006,
    HiddenapiClassData = 0xF000,
}

impl MapItemType {
    pub fn from_raw(value: u16) -> Option<MapItemType> {
        use MapItemType::*;
        Some(match value {
            0x0000 => HeaderItem,
            0x0001 => StringIdItem,
            0x0002 => TypeIdItem,
            0x0003 => ProtoIdItem,
            0x0004 => FieldIdItem,
            0x0005 => MethodIdItem,
            0x0006 => ClassDefItem,
            0x0007 => CallSiteIdItem,
            0x0008 => MethodHandleItem,
            0x1000 => MapList,
            0x1001 => TypeList,
            0x1002 => AnnotationSetRefList,
            0x1003 => AnnotationSetItem,
            0x2000 => ClassDataItem,
            0x2001 => CodeItem,
            0x2002 => StringDataItem,
            0x2003 => DebugInfoItem,
            0x2004 => AnnotationItem,
            0x2005 => EncodedArrayItem,
            0x2006 => AnnotationsDirectoryItem,
            0xF000 => HiddenapiClassData,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodHandleItem {
    pub method_handle_type: u16,
    pub field_or_method_idx: u16, // Field index for accessors, method index otherwise.
}

impl DexItem for MethodHandleItem {
    const SIZE: usize = 8;
    const NAME: &'static str = "MethodHandleItem";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let method_handle_type = cursor.read_u16()?;
        let _reserved1 = cursor.read_u16()?;
        let field_or_method_idx = cursor.read_u16()?;
        let _reserved2 = cursor.read_u16()?;
        Ok(Self {
            method_handle_type,
            field_or_method_idx,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteIdItem {
    pub data_off: u32, // Offset into data section pointing to encoded array items.
}

impl DexItem for CallSiteIdItem {
    const SIZE: usize = 4;
    const NAME: &'static str = "CallSiteIdItem";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            data_off: cursor.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16,
}

impl DexItem for TryItem {
    const SIZE: usize = 8;
    const NAME: &'static str = "TryItem";

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            start_addr: cursor.read_u32()?,
            insn_count: cursor.read_u16()?,
            handler_off: cursor.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatchHandlerData {
    /// `None` for the catch-all handler
    pub type_idx: Option<TypeIndex>,
    pub address: u32,
}

impl CatchHandlerData {
    pub fn is_catch_all(&self) -> bool {
        self.type_idx.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandler {
    /// offset from the start of the handler list, referenced by
    /// `TryItem::handler_off`
    pub offset: u32,
    pub handlers: Vec<CatchHandlerData>,
}

/// Method body metadata. Instructions are kept as raw code units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: Option<u32>,
    pub insns_size: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: Vec<EncodedCatchHandler>,
}

impl CodeItem {
    /// Fixed header size preceding the instructions.
    pub const HEADER_SIZE: usize = 16;

    pub fn handler_at(&self, handler_off: u16) -> Option<&EncodedCatchHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.offset == handler_off as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedField {
    pub field_idx: FieldIndex,
    pub access_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedMethod {
    pub method_idx: MethodIndex,
    pub access_flags: u32,
    pub code_off: Option<u32>,
    /// shared between all methods with the same `code_off`
    pub code: Option<Arc<CodeItem>>,
}

/// Decoded `class_data_item`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassData {
    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods
            .iter()
            .chain(self.virtual_methods.iter())
    }

    pub fn num_fields(&self) -> usize {
        self.static_fields.len() + self.instance_fields.len()
    }

    pub fn num_methods(&self) -> usize {
        self.direct_methods.len() + self.virtual_methods.len()
    }
}
