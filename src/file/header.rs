use serde::Serialize;

use crate::{dex_err, Result};

use super::{ByteCursor, DEX_MAGIC, DEX_MAGIC_VERSIONS};

/// Size of the fixed header up to version 040.
pub const HEADER_SIZE: usize = 0x70;

/// Size of the header of version 041 and later, which appends the container
/// fields.
pub const HEADER_V41_SIZE: usize = 0x78;

#[derive(Debug, Clone, Serialize)]
pub struct Header {
    /// magic value
    magic: [u8; 8],

    /// Taken from Android docs:
    ///
    /// Adler32 checksum of the rest of the file (everything but `magic` and this
    /// field); used to detect file corruption.
    pub checksum: u32,

    /// Android docs:
    ///
    /// SHA-1 signature (hash) of the rest of the file (everything but `magic`,
    /// `checksum`, and this field); used to uniquely identify files.
    signature: [u8; 20],

    /// Size of the entire file including the header.
    pub file_size: u32,

    /// Size of the header (this struct), in bytes. It is 0x70, or 0x78
    /// starting with version 041.
    pub header_size: u32,

    /// Endian contant - only little endian files are supported
    pub endian_tag: u32,

    /// size of the link section, or 0 if this file isn't statically linked
    pub link_size: u32,

    /// offset from the start of the file to the link section, or `0` if
    /// `link_size == 0`.
    pub link_off: u32,

    /// offset from the start of the file to the map item. The offset should be
    /// to an offset into the `data` section.
    pub map_off: u32,

    /// count of strings in the string identifiers list
    pub string_ids_size: u32,

    /// offset from the start of the file to the string identifiers list, or
    /// `0` if `string_ids_size == 0`.
    pub string_ids_off: u32,

    /// count of elements in the type identifiers list, at most `65535`
    pub type_ids_size: u32,

    /// offset from the start of the file to the type identifiers list, or
    /// `0` if `type_ids_size == 0`.
    pub type_ids_off: u32,

    /// count of elements in the proto identifiers list, at most `65535`
    pub proto_ids_size: u32,

    /// offset from the start of the file to the proto identifiers list, or
    /// `0` if `proto_ids_size == 0`.
    pub proto_ids_off: u32,

    /// count of elements in the field identifiers list
    pub field_ids_size: u32,

    /// offset from the start of the file to the field identifiers list, or
    /// `0` if `field_ids_size == 0`.
    pub field_ids_off: u32,

    /// count of elements in the method identifiers list
    pub method_ids_size: u32,

    /// offset from the start of the file to the method identifiers list, or
    /// `0` if `method_ids_size == 0`.
    pub method_ids_off: u32,

    /// count of elements in the class definitions list
    pub class_defs_size: u32,

    /// offset from the start of the file to the class definitions list, or
    /// `0` if `class_defs_size == 0`.
    pub class_defs_off: u32,

    /// size of the data section (in bytes)
    pub data_size: u32,

    /// offset from the start of the file to the data section
    pub data_off: u32,

    /// Container fields, only present in version 041 and later.
    pub container: Option<ContainerInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    /// total size of all dex files in the container.
    pub container_size: u32,
    /// offset of this dex's header in the container.
    pub header_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectionKind {
    StringIds,
    TypeIds,
    ProtoIds,
    FieldIds,
    MethodIds,
    ClassDefs,
    MapList,
}

impl SectionKind {
    /// Size of one record in bytes. The map list is described by its
    /// leading count word only.
    pub const fn item_size(&self) -> usize {
        match self {
            SectionKind::StringIds | SectionKind::TypeIds => 4,
            SectionKind::ProtoIds => 12,
            SectionKind::FieldIds | SectionKind::MethodIds => 8,
            SectionKind::ClassDefs => 32,
            SectionKind::MapList => 4,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SectionKind::StringIds => "string-ids",
            SectionKind::TypeIds => "type-ids",
            SectionKind::ProtoIds => "proto-ids",
            SectionKind::FieldIds => "field-ids",
            SectionKind::MethodIds => "method-ids",
            SectionKind::ClassDefs => "class-defs",
            SectionKind::MapList => "map",
        }
    }
}

/// Offset and element count of one section table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub offset: u32,
    pub count: u32,
}

impl Section {
    pub fn byte_len(&self) -> u64 {
        self.count as u64 * self.kind.item_size() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Header {
    /// Reads the fixed header. Magic and version are checked before anything
    /// else is read, so that arbitrary files are rejected with a header error
    /// instead of a truncation.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Header> {
        let mut magic = [0u8; 8];
        let bytes = cursor.read_bytes(8)?;
        magic.copy_from_slice(bytes);
        Header::check_magic_and_version(&magic)?;

        let checksum = cursor.read_u32()?;
        let mut signature = [0u8; 20];
        let bytes = cursor.read_bytes(20)?;
        signature.copy_from_slice(bytes);

        let mut header = Header {
            magic,
            checksum,
            signature,
            file_size: cursor.read_u32()?,
            header_size: cursor.read_u32()?,
            endian_tag: cursor.read_u32()?,
            link_size: cursor.read_u32()?,
            link_off: cursor.read_u32()?,
            map_off: cursor.read_u32()?,
            string_ids_size: cursor.read_u32()?,
            string_ids_off: cursor.read_u32()?,
            type_ids_size: cursor.read_u32()?,
            type_ids_off: cursor.read_u32()?,
            proto_ids_size: cursor.read_u32()?,
            proto_ids_off: cursor.read_u32()?,
            field_ids_size: cursor.read_u32()?,
            field_ids_off: cursor.read_u32()?,
            method_ids_size: cursor.read_u32()?,
            method_ids_off: cursor.read_u32()?,
            class_defs_size: cursor.read_u32()?,
            class_defs_off: cursor.read_u32()?,
            data_size: cursor.read_u32()?,
            data_off: cursor.read_u32()?,
            container: None,
        };

        if header.get_version() >= 41 {
            header.container = Some(ContainerInfo {
                container_size: cursor.read_u32()?,
                header_off: cursor.read_u32()?,
            });
        }
        Ok(header)
    }

    fn check_magic_and_version(magic: &[u8; 8]) -> Result<()> {
        if &magic[..4] != DEX_MAGIC || magic[7] != 0 {
            return dex_err!(InvalidHeader, BadFileMagic, *magic);
        }

        if !DEX_MAGIC_VERSIONS.contains(&&magic[4..]) {
            return dex_err!(UnsupportedVersion {
                version: String::from_utf8_lossy(&magic[4..7]).into_owned()
            });
        }
        Ok(())
    }

    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    pub fn get_signature(&self) -> &[u8; 20] {
        &self.signature
    }

    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        String::from_utf8_lossy(version_raw)
            .parse()
            .unwrap_or_default()
    }

    pub fn get_version_str(&self) -> String {
        String::from_utf8_lossy(&self.magic[4..7]).into_owned()
    }

    /// Header size expected for the version of this file.
    pub fn expected_header_size(&self) -> usize {
        if self.get_version() >= 41 {
            HEADER_V41_SIZE
        } else {
            HEADER_SIZE
        }
    }

    pub fn sections(&self) -> [Section; 7] {
        let section = |kind, offset, count| Section {
            kind,
            offset,
            count,
        };
        [
            section(
                SectionKind::StringIds,
                self.string_ids_off,
                self.string_ids_size,
            ),
            section(SectionKind::TypeIds, self.type_ids_off, self.type_ids_size),
            section(SectionKind::ProtoIds, self.proto_ids_off, self.proto_ids_size),
            section(SectionKind::FieldIds, self.field_ids_off, self.field_ids_size),
            section(
                SectionKind::MethodIds,
                self.method_ids_off,
                self.method_ids_size,
            ),
            section(
                SectionKind::ClassDefs,
                self.class_defs_off,
                self.class_defs_size,
            ),
            section(
                SectionKind::MapList,
                self.map_off,
                (self.map_off != 0) as u32,
            ),
        ]
    }

    pub fn section(&self, kind: SectionKind) -> Section {
        // sections() is ordered like SectionKind
        self.sections()[kind as usize]
    }
}
