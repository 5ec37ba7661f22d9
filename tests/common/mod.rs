//! Builds small, well-formed dex files for tests and benchmarks.
#![allow(dead_code)]

use dexinfo::file::{
    DexImage, ACC_CONSTRUCTOR, ACC_NATIVE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, NO_INDEX,
};

pub const HEADER_SIZE: usize = 0x70;
pub const HEADER_V41_SIZE: usize = 0x78;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TryBlock {
    pub start_addr: u32,
    pub insn_count: u16,
    /// `(type_idx, address)`, `None` as type is the catch-all handler
    pub handlers: Vec<(Option<u32>, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeBody {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub insns: Vec<u16>,
    pub tries: Vec<TryBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code: Option<CodeBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassBody {
    pub static_fields: Vec<FieldEntry>,
    pub instance_fields: Vec<FieldEntry>,
    pub direct_methods: Vec<MethodEntry>,
    pub virtual_methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: Option<u32>,
    pub interfaces: Vec<u32>,
    pub source_file_idx: Option<u32>,
    pub data: Option<ClassBody>,
}

/// Offsets of the parts written by [`DexBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub string_ids_off: usize,
    pub type_ids_off: usize,
    pub proto_ids_off: usize,
    pub field_ids_off: usize,
    pub method_ids_off: usize,
    pub class_defs_off: usize,
    pub data_off: usize,
    pub string_data_offs: Vec<usize>,
    /// one entry per class, in class order
    pub class_data_offs: Vec<Option<usize>>,
    pub code_offs: Vec<usize>,
    pub map_off: usize,
    pub file_size: usize,
}

#[derive(Debug, Clone)]
pub struct DexBuilder {
    pub version: [u8; 3],
    pub strings: Vec<String>,
    /// string index of each type descriptor
    pub types: Vec<u32>,
    /// `(shorty_idx, return_type_idx, parameters)`
    pub protos: Vec<(u32, u32, Vec<u32>)>,
    /// `(class_idx, type_idx, name_idx)`
    pub fields: Vec<(u16, u16, u32)>,
    /// `(class_idx, proto_idx, name_idx)`
    pub methods: Vec<(u16, u16, u32)>,
    pub classes: Vec<ClassEntry>,
    /// `(method_handle_type, field_or_method_idx)`
    pub method_handles: Vec<(u16, u16)>,
    pub call_sites: Vec<u32>,
}

impl Default for DexBuilder {
    fn default() -> Self {
        Self {
            version: *b"035",
            strings: Vec::new(),
            types: Vec::new(),
            protos: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
            method_handles: Vec::new(),
            call_sites: Vec::new(),
        }
    }
}

pub fn put_u16(out: &mut [u8], off: usize, value: u16) {
    out[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(out: &mut [u8], off: usize, value: u32) {
    out[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_uleb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_sleb(out: &mut Vec<u8>, mut value: i32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// MUTF-8 with a raw zero byte for U+0000, so embedded zeros stay visible
/// in the encoded data.
pub fn write_mutf8(out: &mut Vec<u8>, value: &str) {
    for unit in value.encode_utf16() {
        let unit = unit as u32;
        match unit {
            0x00..=0x7f => out.push(unit as u8),
            0x80..=0x7ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
}

fn align4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn write_type_list(out: &mut Vec<u8>, types: &[u32]) -> usize {
    align4(out);
    let off = out.len();
    out.extend_from_slice(&(types.len() as u32).to_le_bytes());
    for idx in types {
        out.extend_from_slice(&(*idx as u16).to_le_bytes());
    }
    off
}

fn write_code_item(out: &mut Vec<u8>, code: &CodeBody) -> usize {
    align4(out);
    let off = out.len();
    for value in [
        code.registers_size,
        code.ins_size,
        code.outs_size,
        code.tries.len() as u16,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
    out.extend_from_slice(&(code.insns.len() as u32).to_le_bytes());
    for unit in &code.insns {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    if code.tries.is_empty() {
        return off;
    }
    if code.insns.len() % 2 == 1 {
        out.extend_from_slice(&[0, 0]);
    }

    // handler offsets are relative to the start of the list
    let mut list = Vec::new();
    write_uleb(&mut list, code.tries.len() as u32);
    let mut handler_offs = Vec::with_capacity(code.tries.len());
    for try_block in &code.tries {
        handler_offs.push(list.len() as u16);
        let typed: Vec<_> = try_block
            .handlers
            .iter()
            .filter_map(|(ty, addr)| ty.map(|ty| (ty, *addr)))
            .collect();
        let catch_all = try_block
            .handlers
            .iter()
            .find(|(ty, _)| ty.is_none())
            .map(|(_, addr)| *addr);
        let size = typed.len() as i32;
        write_sleb(&mut list, if catch_all.is_some() { -size } else { size });
        for (ty, addr) in typed {
            write_uleb(&mut list, ty);
            write_uleb(&mut list, addr);
        }
        if let Some(addr) = catch_all {
            write_uleb(&mut list, addr);
        }
    }

    for (try_block, handler_off) in code.tries.iter().zip(handler_offs) {
        out.extend_from_slice(&try_block.start_addr.to_le_bytes());
        out.extend_from_slice(&try_block.insn_count.to_le_bytes());
        out.extend_from_slice(&handler_off.to_le_bytes());
    }
    out.extend_from_slice(&list);
    off
}

/// Data items already written, so equal items are written once and shared.
#[derive(Default)]
struct Written {
    type_lists: Vec<(Vec<u32>, usize)>,
    code_items: Vec<(CodeBody, usize)>,
    class_data: Vec<(ClassBody, usize)>,
}

fn write_once<T: PartialEq + Clone>(
    written: &mut Vec<(T, usize)>,
    value: &T,
    out: &mut Vec<u8>,
    write: impl FnOnce(&mut Vec<u8>) -> usize,
) -> usize {
    if let Some((_, off)) = written.iter().find(|(item, _)| item == value) {
        return *off;
    }
    let off = write(out);
    written.push((value.clone(), off));
    off
}

fn write_encoded_fields(out: &mut Vec<u8>, fields: &[FieldEntry]) {
    let mut prev = 0;
    for field in fields {
        write_uleb(out, field.field_idx - prev);
        write_uleb(out, field.access_flags);
        prev = field.field_idx;
    }
}

fn write_encoded_methods(out: &mut Vec<u8>, methods: &[MethodEntry], code_offs: &[usize]) {
    let mut prev = 0;
    for (method, code_off) in methods.iter().zip(code_offs) {
        write_uleb(out, method.method_idx - prev);
        write_uleb(out, method.access_flags);
        write_uleb(out, *code_off as u32);
        prev = method.method_idx;
    }
}

impl DexBuilder {
    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let header_size = if self.version >= *b"041" {
            HEADER_V41_SIZE
        } else {
            HEADER_SIZE
        };
        let mut layout = Layout::default();
        let mut written = Written::default();
        let mut out = vec![0u8; header_size];

        let reserve = |out: &mut Vec<u8>, count: usize, size: usize| {
            let off = out.len();
            out.resize(off + count * size, 0);
            if count == 0 {
                0
            } else {
                off
            }
        };
        layout.string_ids_off = reserve(&mut out, self.strings.len(), 4);
        layout.type_ids_off = reserve(&mut out, self.types.len(), 4);
        layout.proto_ids_off = reserve(&mut out, self.protos.len(), 12);
        layout.field_ids_off = reserve(&mut out, self.fields.len(), 8);
        layout.method_ids_off = reserve(&mut out, self.methods.len(), 8);
        layout.class_defs_off = reserve(&mut out, self.classes.len(), 32);
        let method_handles_off = reserve(&mut out, self.method_handles.len(), 8);
        let call_sites_off = reserve(&mut out, self.call_sites.len(), 4);
        layout.data_off = out.len();

        for (idx, (mh_type, target)) in self.method_handles.iter().enumerate() {
            let off = method_handles_off + idx * 8;
            put_u16(&mut out, off, *mh_type);
            put_u16(&mut out, off + 4, *target);
        }
        for (idx, data_off) in self.call_sites.iter().enumerate() {
            put_u32(&mut out, call_sites_off + idx * 4, *data_off);
        }

        for (idx, value) in self.strings.iter().enumerate() {
            let off = out.len();
            write_uleb(&mut out, value.encode_utf16().count() as u32);
            write_mutf8(&mut out, value);
            out.push(0);
            put_u32(&mut out, layout.string_ids_off + idx * 4, off as u32);
            layout.string_data_offs.push(off);
        }

        for (idx, descriptor_idx) in self.types.iter().enumerate() {
            put_u32(&mut out, layout.type_ids_off + idx * 4, *descriptor_idx);
        }

        for (idx, (shorty_idx, return_type_idx, params)) in self.protos.iter().enumerate() {
            let params_off = if params.is_empty() {
                0
            } else {
                write_once(&mut written.type_lists, params, &mut out, |out| {
                    write_type_list(out, params)
                })
            };
            let off = layout.proto_ids_off + idx * 12;
            put_u32(&mut out, off, *shorty_idx);
            put_u32(&mut out, off + 4, *return_type_idx);
            put_u32(&mut out, off + 8, params_off as u32);
        }

        for (idx, (class_idx, type_idx, name_idx)) in self.fields.iter().enumerate() {
            let off = layout.field_ids_off + idx * 8;
            put_u16(&mut out, off, *class_idx);
            put_u16(&mut out, off + 2, *type_idx);
            put_u32(&mut out, off + 4, *name_idx);
        }

        for (idx, (class_idx, proto_idx, name_idx)) in self.methods.iter().enumerate() {
            let off = layout.method_ids_off + idx * 8;
            put_u16(&mut out, off, *class_idx);
            put_u16(&mut out, off + 2, *proto_idx);
            put_u32(&mut out, off + 4, *name_idx);
        }

        for (idx, class) in self.classes.iter().enumerate() {
            let interfaces_off = if class.interfaces.is_empty() {
                0
            } else {
                write_once(&mut written.type_lists, &class.interfaces, &mut out, |out| {
                    write_type_list(out, &class.interfaces)
                })
            };

            let class_data_off = class
                .data
                .as_ref()
                .map(|data| Self::write_class_data(&mut out, data, &mut written, &mut layout));
            layout.class_data_offs.push(class_data_off);

            let off = layout.class_defs_off + idx * 32;
            put_u32(&mut out, off, class.class_idx);
            put_u32(&mut out, off + 4, class.access_flags);
            put_u32(&mut out, off + 8, class.superclass_idx.unwrap_or(NO_INDEX));
            put_u32(&mut out, off + 12, interfaces_off as u32);
            put_u32(&mut out, off + 16, class.source_file_idx.unwrap_or(NO_INDEX));
            put_u32(&mut out, off + 20, 0);
            put_u32(&mut out, off + 24, class_data_off.unwrap_or(0) as u32);
            put_u32(&mut out, off + 28, 0);
        }

        align4(&mut out);
        layout.map_off = out.len();
        let mut map_items: Vec<(u16, usize, usize)> = vec![(0x0000, 1, 0)];
        let sections = [
            (0x0001, self.strings.len(), layout.string_ids_off),
            (0x0002, self.types.len(), layout.type_ids_off),
            (0x0003, self.protos.len(), layout.proto_ids_off),
            (0x0004, self.fields.len(), layout.field_ids_off),
            (0x0005, self.methods.len(), layout.method_ids_off),
            (0x0006, self.classes.len(), layout.class_defs_off),
            (0x0008, self.method_handles.len(), method_handles_off),
            (0x0007, self.call_sites.len(), call_sites_off),
        ];
        map_items.extend(sections.into_iter().filter(|(_, size, _)| *size > 0));
        map_items.push((0x1000, 1, layout.map_off));
        out.extend_from_slice(&(map_items.len() as u32).to_le_bytes());
        for (ty, size, off) in map_items {
            out.extend_from_slice(&ty.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&(size as u32).to_le_bytes());
            out.extend_from_slice(&(off as u32).to_le_bytes());
        }
        layout.file_size = out.len();

        // header
        out[..4].copy_from_slice(b"dex\n");
        out[4..7].copy_from_slice(&self.version);
        out[7] = 0;
        let words = [
            layout.file_size,
            header_size,
            0x12345678,
            0,
            0,
            layout.map_off,
            self.strings.len(),
            layout.string_ids_off,
            self.types.len(),
            layout.type_ids_off,
            self.protos.len(),
            layout.proto_ids_off,
            self.fields.len(),
            layout.field_ids_off,
            self.methods.len(),
            layout.method_ids_off,
            self.classes.len(),
            layout.class_defs_off,
            layout.file_size - layout.data_off,
            layout.data_off,
        ];
        for (idx, word) in words.into_iter().enumerate() {
            put_u32(&mut out, 32 + idx * 4, word as u32);
        }
        if header_size == HEADER_V41_SIZE {
            put_u32(&mut out, 0x70, layout.file_size as u32);
            put_u32(&mut out, 0x74, 0);
        }
        seal(&mut out);
        (out, layout)
    }

    fn write_class_data(
        out: &mut Vec<u8>,
        data: &ClassBody,
        written: &mut Written,
        layout: &mut Layout,
    ) -> usize {
        if let Some((_, off)) = written.class_data.iter().find(|(item, _)| item == data) {
            return *off;
        }
        let mut code_offs = |methods: &[MethodEntry], out: &mut Vec<u8>| -> Vec<usize> {
            methods
                .iter()
                .map(|method| match &method.code {
                    Some(code) => {
                        let off = write_once(&mut written.code_items, code, out, |out| {
                            write_code_item(out, code)
                        });
                        layout.code_offs.push(off);
                        off
                    }
                    None => 0,
                })
                .collect()
        };
        let direct_code = code_offs(&data.direct_methods, out);
        let virtual_code = code_offs(&data.virtual_methods, out);

        let off = out.len();
        write_uleb(out, data.static_fields.len() as u32);
        write_uleb(out, data.instance_fields.len() as u32);
        write_uleb(out, data.direct_methods.len() as u32);
        write_uleb(out, data.virtual_methods.len() as u32);
        write_encoded_fields(out, &data.static_fields);
        write_encoded_fields(out, &data.instance_fields);
        write_encoded_methods(out, &data.direct_methods, &direct_code);
        write_encoded_methods(out, &data.virtual_methods, &virtual_code);
        written.class_data.push((data.clone(), off));
        off
    }
}

/// Recomputes signature and checksum of a built file.
pub fn seal(data: &mut [u8]) {
    let signature = DexImage::calculate_signature(data);
    data[12..32].copy_from_slice(&signature);
    let checksum = DexImage::calculate_checksum(data).unwrap();
    data[8..12].copy_from_slice(&checksum.to_le_bytes());
}

/// A dex file with only a header, empty tables and a map list.
pub fn empty_dex() -> DexBuilder {
    DexBuilder::default()
}

pub mod sample {
    //! String, type, proto, field and method indices of [`super::sample_dex`].
    pub const S_SOURCE: u32 = 0;
    pub const S_INIT: u32 = 1;
    pub const S_HELLO: u32 = 2;
    pub const S_OBJECT: u32 = 3;
    pub const S_RUNNABLE: u32 = 4;
    pub const S_EXCEPTION: u32 = 5;
    pub const S_STRING_ARRAY: u32 = 6;
    pub const S_I: u32 = 7;
    pub const S_V: u32 = 8;
    pub const S_VL: u32 = 9;
    pub const S_COUNT: u32 = 10;
    pub const S_MAIN: u32 = 11;
    pub const S_RUN: u32 = 12;
    pub const S_ZERO: u32 = 13;
    pub const S_CAFE: u32 = 14;
    pub const S_HELPER: u32 = 15;
    pub const S_NAME: u32 = 16;
    pub const S_STRING: u32 = 17;
    pub const S_NATIVE: u32 = 18;

    pub const T_INT: u32 = 0;
    pub const T_HELLO: u32 = 1;
    pub const T_OBJECT: u32 = 2;
    pub const T_RUNNABLE: u32 = 3;
    pub const T_EXCEPTION: u32 = 4;
    pub const T_STRING_ARRAY: u32 = 5;
    pub const T_VOID: u32 = 6;
    pub const T_HELPER: u32 = 7;
    pub const T_STRING: u32 = 8;

    pub const P_VOID: u32 = 0;
    pub const P_VOID_STRING_ARRAY: u32 = 1;

    pub const F_COUNT: u32 = 0;
    pub const F_NAME: u32 = 1;

    pub const M_INIT: u32 = 0;
    pub const M_MAIN: u32 = 1;
    pub const M_RUN: u32 = 2;
    pub const M_NATIVE: u32 = 3;
}

/// Two classes:
/// - `LHello;` (source `Hello.java`) implements `Ljava/lang/Runnable;` with
///   a static and an instance field, direct methods `<init>` and `main`
///   and the virtual method `run`, which has a try block.
/// - `LHelper;` without source file and without class data.
pub fn sample_dex() -> DexBuilder {
    use sample::*;

    let strings = [
        "Hello.java",
        "<init>",
        "LHello;",
        "Ljava/lang/Object;",
        "Ljava/lang/Runnable;",
        "Ljava/lang/Exception;",
        "[Ljava/lang/String;",
        "I",
        "V",
        "VL",
        "count",
        "main",
        "run",
        "a\0b",
        "caf\u{e9}",
        "LHelper;",
        "name",
        "Ljava/lang/String;",
        "nativeCall",
    ];
    let hello_data = ClassBody {
        static_fields: vec![FieldEntry {
            field_idx: F_COUNT,
            access_flags: ACC_PRIVATE | ACC_STATIC,
        }],
        instance_fields: vec![FieldEntry {
            field_idx: F_NAME,
            access_flags: ACC_PUBLIC,
        }],
        direct_methods: vec![
            MethodEntry {
                method_idx: M_INIT,
                access_flags: ACC_PUBLIC | ACC_CONSTRUCTOR,
                code: Some(CodeBody {
                    registers_size: 1,
                    ins_size: 1,
                    outs_size: 1,
                    // invoke-direct {v0}, Ljava/lang/Object;-><init>()V; return-void
                    insns: vec![0x1070, 0x0000, 0x0000, 0x000e],
                    tries: Vec::new(),
                }),
            },
            MethodEntry {
                method_idx: M_MAIN,
                access_flags: ACC_PUBLIC | ACC_STATIC,
                code: Some(CodeBody {
                    registers_size: 1,
                    ins_size: 1,
                    outs_size: 0,
                    insns: vec![0x000e],
                    tries: Vec::new(),
                }),
            },
            MethodEntry {
                method_idx: M_NATIVE,
                access_flags: ACC_PRIVATE | ACC_STATIC | ACC_NATIVE,
                code: None,
            },
        ],
        virtual_methods: vec![MethodEntry {
            method_idx: M_RUN,
            access_flags: ACC_PUBLIC,
            code: Some(CodeBody {
                registers_size: 2,
                ins_size: 1,
                outs_size: 0,
                insns: vec![0x0000, 0x0000, 0x000e],
                tries: vec![TryBlock {
                    start_addr: 0,
                    insn_count: 2,
                    handlers: vec![(Some(T_EXCEPTION), 2), (None, 2)],
                }],
            }),
        }],
    };

    DexBuilder {
        strings: strings.iter().map(|s| s.to_string()).collect(),
        types: vec![
            S_I,
            S_HELLO,
            S_OBJECT,
            S_RUNNABLE,
            S_EXCEPTION,
            S_STRING_ARRAY,
            S_V,
            S_HELPER,
            S_STRING,
        ],
        protos: vec![
            (S_V, T_VOID, Vec::new()),
            (S_VL, T_VOID, vec![T_STRING_ARRAY]),
        ],
        fields: vec![
            (T_HELLO as u16, T_INT as u16, S_COUNT),
            (T_HELLO as u16, T_STRING as u16, S_NAME),
        ],
        methods: vec![
            (T_HELLO as u16, P_VOID as u16, S_INIT),
            (T_HELLO as u16, P_VOID_STRING_ARRAY as u16, S_MAIN),
            (T_HELLO as u16, P_VOID as u16, S_RUN),
            (T_HELLO as u16, P_VOID as u16, S_NATIVE),
        ],
        classes: vec![
            ClassEntry {
                class_idx: T_HELLO,
                access_flags: ACC_PUBLIC,
                superclass_idx: Some(T_OBJECT),
                interfaces: vec![T_RUNNABLE],
                source_file_idx: Some(S_SOURCE),
                data: Some(hello_data),
            },
            ClassEntry {
                class_idx: T_HELPER,
                access_flags: 0,
                superclass_idx: Some(T_OBJECT),
                interfaces: Vec::new(),
                source_file_idx: None,
                data: None,
            },
        ],
        method_handles: vec![(0x04, M_MAIN as u16)],
        call_sites: Vec::new(),
        ..DexBuilder::default()
    }
}

/// One class with one static method that has no code item.
pub fn single_static_method_dex() -> DexBuilder {
    DexBuilder {
        strings: ["LA;", "Ljava/lang/Object;", "V", "f"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        types: vec![0, 1, 2],
        protos: vec![(2, 2, Vec::new())],
        methods: vec![(0, 0, 3)],
        classes: vec![ClassEntry {
            class_idx: 0,
            access_flags: ACC_PUBLIC,
            superclass_idx: Some(1),
            interfaces: Vec::new(),
            source_file_idx: None,
            data: Some(ClassBody {
                direct_methods: vec![MethodEntry {
                    method_idx: 0,
                    access_flags: ACC_STATIC | ACC_NATIVE,
                    code: None,
                }],
                ..ClassBody::default()
            }),
        }],
        ..DexBuilder::default()
    }
}
