use std::fmt::Debug;

use thiserror::Error;

#[derive(Error)]
pub enum DexError {
    #[error("Invalid dex header: {0}")]
    InvalidHeader(#[from] HeaderError),

    #[error("Unsupported dex version: {version:?}")]
    UnsupportedVersion { version: String },

    #[error("Truncated data: requested {requested} byte(s) at offset {offset}, but only {available} available")]
    TruncatedData {
        offset: usize,
        requested: usize,
        available: usize,
    },

    #[error("Malformed LEB128 at offset {offset}: value does not fit into {bits} bits")]
    MalformedVarint { offset: usize, bits: u32 },

    #[error("Position({offset}) is out of bounds (size: {size})")]
    OutOfBounds { offset: i64, size: usize },

    #[error("Index({index}) to {item_ty} should be less than {max}")]
    IndexOutOfRange {
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Encountered invalid encoded index that would overflow: index({index}) + next index({next_index}) > u32::MAX for {item_ty}")]
    BadEncodedIndex {
        index: u32,
        next_index: u32,
        item_ty: &'static str,
    },

    #[error("Bad checksum: {actual:#010x}, expected {expected:#010x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Bad SHA-1 signature: {actual}, expected {expected}")]
    BadSignature { actual: String, expected: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons for rejecting the fixed header of a dex file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Bad file magic: {0:02x?}")]
    BadFileMagic([u8; 8]),

    #[error("Bad file size ({actual}, expected at least {expected})")]
    FileSizeAtLeast { actual: usize, expected: usize },

    #[error("Bad header size: {size}, expected {expected}")]
    BadHeaderSize { size: u32, expected: u32 },

    #[error("Unexpected endian tag: {0:#x}")]
    UnexpectedEndianess(u32),

    #[error("Offset({offset}) should be after header({header_size}) for {section}")]
    BadOffsetInHeader {
        offset: u32,
        header_size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be within file size {size} for {section}")]
    BadOffsetTooLarge {
        offset: u32,
        size: usize,
        section: &'static str,
    },

    #[error("Section end({end}) should be within file size {size} for {section}")]
    BadSection {
        end: u64,
        size: usize,
        section: &'static str,
    },
}

#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err($crate::error::DexError::$name)
    };
    (InvalidHeader, $variant:ident { $($arg:tt)* }) => {
        Err($crate::error::DexError::InvalidHeader(
            $crate::error::HeaderError::$variant { $($arg)* },
        ))
    };
    (InvalidHeader, $variant:ident, $($arg:tt)*) => {
        Err($crate::error::DexError::InvalidHeader(
            $crate::error::HeaderError::$variant($($arg)*),
        ))
    };
    ($name:ident { $($arg:tt)* }) => {
        Err($crate::error::DexError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err($crate::error::DexError::$name($($arg)*))
    };
}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
