use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, trace, warn};
use serde::Serialize;

macro_rules! check_lt_result {
    ($idx:expr, $count:expr, $item_ty:tt) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(IndexOutOfRange {
                index: $idx as u32,
                item_ty: stringify!($item_ty),
                max: $count as usize,
            });
        }
    };
}

pub mod cursor;
pub use cursor::*;
pub mod structs;
pub use structs::*;
pub mod header;
pub use header::*;
pub mod tables;
pub mod class_accessor;
pub use class_accessor::*;
pub mod code_item_accessors;
pub use code_item_accessors::*;
pub mod modifiers;
pub use modifiers::*;
pub mod verifier;
pub use verifier::VerifyPreset;
pub mod container;
pub use container::*;
pub mod dump;

use crate::{dex_err, error::DexError, Result};

pub const DEX_MAGIC: &[u8] = b"dex\n";
pub const DEX_MAGIC_VERSIONS: &[&[u8]] = &[
    b"035\0", b"037\0", // Dex version 037: Android "N" and beyond.
    b"038\0", // Dex version 038: Android "O" and beyond.
    b"039\0", // Dex version 039: Android "P" and beyond.
    b"040\0", // Dex version 040: Android "Q" and beyond (aka Android 10).
    b"041\0", // Dex version 041: Android "V" and beyond (aka Android 15).
];

pub const DEX_ENDIAN_CONSTANT: u32 = 0x12345678;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DexLocation {
    InMemory,
    Path(String),
}

impl From<&str> for DexLocation {
    fn from(s: &str) -> Self {
        DexLocation::Path(s.to_string())
    }
}

impl fmt::Display for DexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexLocation::InMemory => f.write_str("[in-memory]"),
            DexLocation::Path(path) => f.write_str(path),
        }
    }
}

/// Type lists, code items and class data decoded during one parse, keyed by
/// file offset. Records that point at the same offset share one decoded
/// item, which is validated only once.
#[derive(Default)]
struct SharedItems {
    type_lists: HashMap<u32, TypeList>,
    code_items: HashMap<u32, Arc<CodeItem>>,
    class_data: HashMap<u32, Arc<ClassData>>,
}

impl SharedItems {
    fn type_list(&mut self, data: &[u8], off: u32, num_types: usize) -> Result<TypeList> {
        if let Some(list) = self.type_lists.get(&off) {
            return Ok(Arc::clone(list));
        }
        let list = tables::read_type_list(data, off)?;
        for type_idx in list.iter() {
            check_lt_result!(*type_idx, num_types, TypeId);
        }
        self.type_lists.insert(off, Arc::clone(&list));
        Ok(list)
    }

    fn class_data(&mut self, dex: &DexImage, data: &[u8], off: u32) -> Result<Arc<ClassData>> {
        if let Some(class_data) = self.class_data.get(&off) {
            trace!("class data at {off:#x} is shared");
            return Ok(Arc::clone(class_data));
        }
        let code_items = &mut self.code_items;
        let decoded = ClassAccessor::new(data, off)?.read_class_data_with(|code_off| {
            if let Some(code) = code_items.get(&code_off) {
                return Ok(Arc::clone(code));
            }
            let code = CodeItemAccessor::new(data, code_off)?.to_code_item()?;
            dex.check_code_item(&code)?;
            let code = Arc::new(code);
            code_items.insert(code_off, Arc::clone(&code));
            Ok(code)
        })?;
        dex.check_class_data(&decoded)?;
        let decoded = Arc::new(decoded);
        self.class_data.insert(off, Arc::clone(&decoded));
        Ok(decoded)
    }
}

/// A fully decoded dex file.
///
/// Built in a single pass by [`DexImage::parse`] and immutable afterwards.
/// Every table index stored in the image has been checked against its table
/// during parsing, lookups with caller supplied indices fail with
/// [`DexError::IndexOutOfRange`].
#[derive(Debug, Clone, Serialize)]
pub struct DexImage {
    location: DexLocation,
    header: Header,

    string_ids: Vec<StringId>,
    strings: Vec<DexString>,
    type_ids: Vec<TypeId>,
    proto_ids: Vec<ProtoId>,
    field_ids: Vec<FieldId>,
    method_ids: Vec<MethodId>,
    class_defs: Vec<ClassDef>,
    // one entry per class def, `None` without class data
    class_data: Vec<Option<Arc<ClassData>>>,

    map_list: Vec<MapItem>,
    method_handles: Vec<MethodHandleItem>,
    call_site_ids: Vec<CallSiteIdItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MethodKind {
    Direct,
    Virtual,
}

/// A method id resolved to its names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodSignature<'a> {
    /// descriptor of the defining class
    pub class: &'a str,
    pub name: &'a str,
    pub shorty: &'a str,
    pub return_type: &'a str,
    pub parameters: Vec<&'a str>,
}

impl MethodSignature<'_> {
    /// Method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub fn descriptor(&self) -> String {
        format!("({}){}", self.parameters.concat(), self.return_type)
    }
}

impl fmt::Display for MethodSignature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.descriptor())
    }
}

/// An encoded method of a class together with its resolved signature.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMethod<'a> {
    pub method_idx: MethodIndex,
    pub kind: MethodKind,
    pub access_flags: u32,
    pub code_off: Option<u32>,
    pub code: Option<&'a CodeItem>,
    pub signature: MethodSignature<'a>,
}

/// An encoded field of a class together with its resolved names.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedField<'a> {
    pub field_idx: FieldIndex,
    pub is_static: bool,
    pub access_flags: u32,
    pub class: &'a str,
    pub name: &'a str,
    pub type_: &'a str,
}

impl DexImage {
    /// Parses an in-memory dex file without integrity checks.
    pub fn parse(data: &[u8]) -> Result<DexImage> {
        DexImage::parse_with(data, DexLocation::InMemory, VerifyPreset::None)
    }

    pub fn from_container<C>(
        container: &C,
        location: DexLocation,
        preset: VerifyPreset,
    ) -> Result<DexImage>
    where
        C: DexContainer + ?Sized,
    {
        DexImage::parse_with(container.data(), location, preset)
    }

    /// Reads the whole source into memory and parses it.
    pub fn from_source<S: ByteSource + ?Sized>(source: &mut S) -> Result<DexImage> {
        let data = source.read_all()?;
        DexImage::parse(&data)
    }

    pub fn parse_with(data: &[u8], location: DexLocation, preset: VerifyPreset) -> Result<DexImage> {
        let header = Header::read(&mut ByteCursor::new(data))?;
        debug!(
            "{location}: dex version {}, file size {}",
            header.get_version_str(),
            header.file_size
        );
        verifier::check_header(&header)?;

        let file_size = header.file_size as usize;
        if data.len() < file_size {
            return dex_err!(TruncatedData {
                offset: data.len(),
                requested: file_size - data.len(),
                available: 0,
            });
        }
        if data.len() > file_size {
            warn!(
                "{location}: ignoring {} trailing byte(s) after the declared file size",
                data.len() - file_size
            );
        }
        let data = &data[..file_size];
        verifier::verify_integrity(data, &header, preset)?;

        let string_ids: Vec<StringId> =
            tables::read_section(data, header.section(SectionKind::StringIds))?;
        let type_ids = tables::read_section(data, header.section(SectionKind::TypeIds))?;
        let mut proto_ids: Vec<ProtoId> =
            tables::read_section(data, header.section(SectionKind::ProtoIds))?;
        let field_ids = tables::read_section(data, header.section(SectionKind::FieldIds))?;
        let method_ids = tables::read_section(data, header.section(SectionKind::MethodIds))?;
        let mut class_defs: Vec<ClassDef> =
            tables::read_section(data, header.section(SectionKind::ClassDefs))?;
        let strings = tables::read_strings(data, &string_ids)?;

        let mut shared = SharedItems::default();
        for proto_id in proto_ids.iter_mut() {
            if let Some(off) = proto_id.parameters_off {
                proto_id.parameters = shared.type_list(data, off, type_ids.len())?;
            }
        }
        for class_def in class_defs.iter_mut() {
            if let Some(off) = class_def.interfaces_off {
                class_def.interfaces = shared.type_list(data, off, type_ids.len())?;
            }
        }

        let map_list = match header.map_off {
            0 => Vec::new(),
            off => tables::read_map_list(data, off)?,
        };
        let mut method_handles = Vec::new();
        let mut call_site_ids = Vec::new();
        for map_item in &map_list {
            let (off, size) = (map_item.off as usize, map_item.size as usize);
            match map_item.kind() {
                Some(MapItemType::MethodHandleItem) => {
                    method_handles = tables::read_items(data, off, size)?
                }
                Some(MapItemType::CallSiteIdItem) => {
                    call_site_ids = tables::read_items(data, off, size)?
                }
                Some(_) => {}
                None => trace!(
                    "unknown map item type {:#06x} at {:#x}",
                    map_item.type_,
                    map_item.off
                ),
            }
        }

        let mut dex = DexImage {
            location,
            header,
            string_ids,
            strings,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
            class_data: Vec::new(),
            map_list,
            method_handles,
            call_site_ids,
        };
        dex.check_references()?;

        let mut class_data = Vec::with_capacity(dex.class_defs.len());
        for (idx, class_def) in dex.class_defs.iter().enumerate() {
            let Some(off) = class_def.class_data_off else {
                trace!("class {idx} has no class data");
                class_data.push(None);
                continue;
            };
            class_data.push(Some(shared.class_data(&dex, data, off)?));
        }
        dex.class_data = class_data;

        debug!(
            "{}: {} strings, {} types, {} protos, {} fields, {} methods, {} classes",
            dex.location,
            dex.strings.len(),
            dex.type_ids.len(),
            dex.proto_ids.len(),
            dex.field_ids.len(),
            dex.method_ids.len(),
            dex.class_defs.len()
        );
        Ok(dex)
    }

    /// Adler-32 checksum of `data`, as stored in the header.
    pub fn calculate_checksum(data: &[u8]) -> Result<u32> {
        verifier::calculate_checksum(data)
    }

    /// SHA-1 signature of `data`, as stored in the header.
    pub fn calculate_signature(data: &[u8]) -> [u8; 20] {
        verifier::calculate_signature(data)
    }

    fn check_references(&self) -> Result<()> {
        let num_strings = self.strings.len();
        let num_types = self.type_ids.len();
        for type_id in &self.type_ids {
            check_lt_result!(type_id.descriptor_idx, num_strings, StringId);
        }
        for proto_id in &self.proto_ids {
            check_lt_result!(proto_id.shorty_idx, num_strings, StringId);
            check_lt_result!(proto_id.return_type_idx, num_types, TypeId);
        }
        for field_id in &self.field_ids {
            check_lt_result!(field_id.class_idx, num_types, TypeId);
            check_lt_result!(field_id.type_idx, num_types, TypeId);
            check_lt_result!(field_id.name_idx, num_strings, StringId);
        }
        for method_id in &self.method_ids {
            check_lt_result!(method_id.class_idx, num_types, TypeId);
            check_lt_result!(method_id.proto_idx, self.proto_ids.len(), ProtoId);
            check_lt_result!(method_id.name_idx, num_strings, StringId);
        }
        for class_def in &self.class_defs {
            check_lt_result!(class_def.class_idx, num_types, TypeId);
            if let Some(superclass_idx) = class_def.superclass_idx {
                check_lt_result!(superclass_idx, num_types, TypeId);
            }
            if let Some(source_file_idx) = class_def.source_file_idx {
                check_lt_result!(source_file_idx, num_strings, StringId);
            }
        }
        Ok(())
    }

    // code items are checked once when first decoded
    fn check_class_data(&self, class_data: &ClassData) -> Result<()> {
        for field in class_data.fields() {
            check_lt_result!(field.field_idx, self.field_ids.len(), FieldId);
        }
        for method in class_data.methods() {
            check_lt_result!(method.method_idx, self.method_ids.len(), MethodId);
        }
        Ok(())
    }

    fn check_code_item(&self, code: &CodeItem) -> Result<()> {
        for handler in code.handlers.iter().flat_map(|h| h.handlers.iter()) {
            if let Some(type_idx) = handler.type_idx {
                check_lt_result!(type_idx, self.type_ids.len(), TypeId);
            }
        }
        Ok(())
    }

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline(always)]
    pub fn location(&self) -> &DexLocation {
        &self.location
    }

    //------------------------------------------------------------------------------
    // Strings
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn get_string_id(&self, idx: StringIndex) -> Result<&StringId> {
        check_lt_result!(idx, self.string_ids.len(), StringId);
        Ok(&self.string_ids[idx as usize])
    }

    #[inline(always)]
    pub fn string_ids(&self) -> &[StringId] {
        &self.string_ids
    }

    #[inline(always)]
    pub fn num_string_ids(&self) -> u32 {
        self.string_ids.len() as u32
    }

    #[inline]
    pub fn get_string(&self, idx: StringIndex) -> Result<&DexString> {
        check_lt_result!(idx, self.strings.len(), StringId);
        Ok(&self.strings[idx as usize])
    }

    #[inline]
    pub fn string_at(&self, idx: StringIndex) -> Result<&str> {
        Ok(&self.get_string(idx)?.value)
    }

    pub fn strings(&self) -> &[DexString] {
        &self.strings
    }

    //------------------------------------------------------------------------------
    // Types
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn get_type_id(&self, idx: TypeIndex) -> Result<&TypeId> {
        check_lt_result!(idx, self.type_ids.len(), TypeId);
        Ok(&self.type_ids[idx as usize])
    }

    #[inline(always)]
    pub fn num_type_ids(&self) -> u32 {
        self.type_ids.len() as u32
    }

    #[inline(always)]
    pub fn get_type_ids(&self) -> &[TypeId] {
        &self.type_ids
    }

    /// Descriptor of the type at `idx`, e.g. `Ljava/lang/Object;`.
    pub fn type_name(&self, idx: TypeIndex) -> Result<&str> {
        self.string_at(self.get_type_id(idx)?.descriptor_idx)
    }

    //------------------------------------------------------------------------------
    // Protos
    //------------------------------------------------------------------------------
    pub fn get_proto_id(&self, idx: ProtoIndex) -> Result<&ProtoId> {
        check_lt_result!(idx, self.proto_ids.len(), ProtoId);
        Ok(&self.proto_ids[idx as usize])
    }

    pub fn num_proto_ids(&self) -> u32 {
        self.proto_ids.len() as u32
    }

    pub fn get_proto_ids(&self) -> &[ProtoId] {
        &self.proto_ids
    }

    pub fn get_shorty_at(&self, idx: ProtoIndex) -> Result<&str> {
        self.string_at(self.get_proto_id(idx)?.shorty_idx)
    }

    //------------------------------------------------------------------------------
    // Fields
    //------------------------------------------------------------------------------
    #[inline]
    pub fn get_field_id(&self, idx: FieldIndex) -> Result<&FieldId> {
        check_lt_result!(idx, self.field_ids.len(), FieldId);
        Ok(&self.field_ids[idx as usize])
    }

    #[inline(always)]
    pub fn num_field_ids(&self) -> u32 {
        self.field_ids.len() as u32
    }

    #[inline(always)]
    pub fn get_field_ids(&self) -> &[FieldId] {
        &self.field_ids
    }

    pub fn get_field_name(&self, field_id: &FieldId) -> Result<&str> {
        self.string_at(field_id.name_idx)
    }

    //------------------------------------------------------------------------------
    // Method Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn get_method_id(&self, idx: MethodIndex) -> Result<&MethodId> {
        check_lt_result!(idx, self.method_ids.len(), MethodId);
        Ok(&self.method_ids[idx as usize])
    }

    #[inline(always)]
    pub fn num_method_ids(&self) -> u32 {
        self.method_ids.len() as u32
    }

    #[inline(always)]
    pub fn get_method_ids(&self) -> &[MethodId] {
        &self.method_ids
    }

    /// Resolves a method id into class, name and prototype strings.
    pub fn method_signature(&self, idx: MethodIndex) -> Result<MethodSignature<'_>> {
        let method_id = self.get_method_id(idx)?;
        let proto_id = self.get_proto_id(method_id.proto_idx)?;
        Ok(MethodSignature {
            class: self.type_name(method_id.class_idx)?,
            name: self.string_at(method_id.name_idx)?,
            shorty: self.string_at(proto_id.shorty_idx)?,
            return_type: self.type_name(proto_id.return_type_idx)?,
            parameters: proto_id
                .parameters
                .iter()
                .map(|param| self.type_name(*param))
                .collect::<Result<_>>()?,
        })
    }

    //------------------------------------------------------------------------------
    // ClassDefs
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn class_count(&self) -> usize {
        self.class_defs.len()
    }

    #[inline(always)]
    pub fn num_class_defs(&self) -> u32 {
        self.class_defs.len() as u32
    }

    #[inline(always)]
    pub fn get_class_defs(&self) -> &[ClassDef] {
        &self.class_defs
    }

    #[inline]
    pub fn class_at(&self, idx: u32) -> Result<&ClassDef> {
        check_lt_result!(idx, self.class_defs.len(), ClassDef);
        Ok(&self.class_defs[idx as usize])
    }

    /// Decoded class data of the class at `idx`, `None` if the class has
    /// no class data.
    pub fn class_data_at(&self, idx: u32) -> Result<Option<&ClassData>> {
        check_lt_result!(idx, self.class_data.len(), ClassDef);
        Ok(self.class_data[idx as usize].as_deref())
    }

    pub fn get_class_desc(&self, class_def: &ClassDef) -> Result<&str> {
        self.type_name(class_def.class_idx)
    }

    pub fn get_superclass_desc(&self, class_def: &ClassDef) -> Result<Option<&str>> {
        class_def
            .superclass_idx
            .map(|idx| self.type_name(idx))
            .transpose()
    }

    pub fn get_source_file(&self, class_def: &ClassDef) -> Result<Option<&str>> {
        class_def
            .source_file_idx
            .map(|idx| self.string_at(idx))
            .transpose()
    }

    pub fn get_interfaces(&self, class_def: &ClassDef) -> Result<Vec<&str>> {
        class_def
            .interfaces
            .iter()
            .map(|idx| self.type_name(*idx))
            .collect()
    }

    /// Direct methods followed by virtual methods of the class at
    /// `class_idx`, each in file order.
    pub fn methods_of(&self, class_idx: u32) -> Result<Vec<ResolvedMethod<'_>>> {
        let Some(class_data) = self.class_data_at(class_idx)? else {
            return Ok(Vec::new());
        };
        let direct = class_data
            .direct_methods
            .iter()
            .map(|method| (MethodKind::Direct, method));
        let virtual_ = class_data
            .virtual_methods
            .iter()
            .map(|method| (MethodKind::Virtual, method));
        direct
            .chain(virtual_)
            .map(|(kind, method)| {
                Ok(ResolvedMethod {
                    method_idx: method.method_idx,
                    kind,
                    access_flags: method.access_flags,
                    code_off: method.code_off,
                    code: method.code.as_deref(),
                    signature: self.method_signature(method.method_idx)?,
                })
            })
            .collect()
    }

    /// Static fields followed by instance fields of the class at
    /// `class_idx`.
    pub fn fields_of(&self, class_idx: u32) -> Result<Vec<ResolvedField<'_>>> {
        let Some(class_data) = self.class_data_at(class_idx)? else {
            return Ok(Vec::new());
        };
        let static_fields = class_data.static_fields.iter().map(|field| (true, field));
        let instance_fields = class_data.instance_fields.iter().map(|field| (false, field));
        static_fields
            .chain(instance_fields)
            .map(|(is_static, field)| {
                let field_id = self.get_field_id(field.field_idx)?;
                Ok(ResolvedField {
                    field_idx: field.field_idx,
                    is_static,
                    access_flags: field.access_flags,
                    class: self.type_name(field_id.class_idx)?,
                    name: self.string_at(field_id.name_idx)?,
                    type_: self.type_name(field_id.type_idx)?,
                })
            })
            .collect()
    }

    //------------------------------------------------------------------------------
    // Map list, method handles and call sites
    //------------------------------------------------------------------------------
    pub fn map_list(&self) -> &[MapItem] {
        &self.map_list
    }

    #[inline(always)]
    pub fn get_method_handle(&self, idx: u32) -> Result<&MethodHandleItem> {
        check_lt_result!(idx, self.method_handles.len(), MethodHandleItem);
        Ok(&self.method_handles[idx as usize])
    }

    #[inline(always)]
    pub fn num_method_handles(&self) -> u32 {
        self.method_handles.len() as u32
    }

    #[inline(always)]
    pub fn get_method_handles(&self) -> &[MethodHandleItem] {
        &self.method_handles
    }

    #[inline(always)]
    pub fn get_call_site_id(&self, idx: u32) -> Result<&CallSiteIdItem> {
        check_lt_result!(idx, self.call_site_ids.len(), CallSiteIdItem);
        Ok(&self.call_site_ids[idx as usize])
    }

    #[inline(always)]
    pub fn num_call_site_ids(&self) -> u32 {
        self.call_site_ids.len() as u32
    }

    #[inline(always)]
    pub fn get_call_site_ids(&self) -> &[CallSiteIdItem] {
        &self.call_site_ids
    }
}

/// Error returned by [`DexImage::parse`] and friends.
pub type ParseError = DexError;
