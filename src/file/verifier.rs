use log::debug;
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::{dex_err, Result};

use super::{Header, DEX_ENDIAN_CONSTANT};

/// Which integrity checks to run in addition to the structural header
/// checks, which always run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerifyPreset {
    #[default]
    None,
    /// Verify the Adler-32 checksum.
    ChecksumOnly,
    /// Verify the checksum and the SHA-1 signature.
    All,
}

/// Adler-32 over everything after the checksum field.
pub fn calculate_checksum(data: &[u8]) -> Result<u32> {
    Ok(adler32::adler32(data.get(12..).unwrap_or_default())?)
}

/// SHA-1 over everything after the signature field.
pub fn calculate_signature(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data.get(32..).unwrap_or_default());
    hasher.finalize().into()
}

pub fn hexlify(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Runs the integrity checks selected by `preset` over `data`, which must
/// already be cut to the file size of the header.
pub fn verify_integrity(data: &[u8], header: &Header, preset: VerifyPreset) -> Result<()> {
    match preset {
        VerifyPreset::All | VerifyPreset::ChecksumOnly => {
            let checksum = calculate_checksum(data)?;
            debug!("computed checksum {checksum:#010x}");
            if checksum != header.checksum {
                return dex_err!(BadChecksum {
                    actual: checksum,
                    expected: header.checksum
                });
            }
        }
        VerifyPreset::None => return Ok(()),
    };

    if preset == VerifyPreset::All {
        let signature = calculate_signature(data);
        if &signature != header.get_signature() {
            return dex_err!(BadSignature {
                actual: hexlify(&signature),
                expected: hexlify(header.get_signature())
            });
        }
    }
    Ok(())
}

/// Structural checks of the header fields against the declared file size.
pub fn check_header(header: &Header) -> Result<()> {
    let file_size = header.file_size as usize;
    let header_size = header.expected_header_size();
    if file_size < header_size {
        return dex_err!(InvalidHeader, FileSizeAtLeast {
            actual: file_size,
            expected: header_size
        });
    }

    // check header size
    if header.header_size as usize != header_size {
        return dex_err!(InvalidHeader, BadHeaderSize {
            size: header.header_size,
            expected: header_size as u32
        });
    }

    // check endian
    if header.endian_tag != DEX_ENDIAN_CONSTANT {
        return dex_err!(InvalidHeader, UnexpectedEndianess, header.endian_tag);
    }

    check_valid_offset_and_size(
        file_size,
        header_size,
        header.link_off,
        header.link_size as u64,
        "link",
    )?;
    for section in header.sections() {
        check_valid_offset_and_size(
            file_size,
            header_size,
            section.offset,
            section.byte_len(),
            section.kind.name(),
        )?;
    }
    check_valid_offset_and_size(
        file_size,
        header_size,
        header.data_off,
        header.data_size as u64,
        "data",
    )
}

fn check_valid_offset_and_size(
    file_size: usize,
    header_size: usize,
    offset: u32,
    size: u64,
    label: &'static str,
) -> Result<()> {
    if size == 0 {
        return Ok(());
    }

    if (offset as usize) < header_size {
        return dex_err!(InvalidHeader, BadOffsetInHeader {
            offset,
            header_size,
            section: label
        });
    }
    if offset as usize > file_size {
        return dex_err!(InvalidHeader, BadOffsetTooLarge {
            offset,
            size: file_size,
            section: label
        });
    }

    let end = offset as u64 + size;
    if end > file_size as u64 {
        return dex_err!(InvalidHeader, BadSection {
            end,
            size: file_size,
            section: label
        });
    }

    // TODO: alignment checks for the id tables (4 bytes)
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DexError, HeaderError};
    use crate::file::{header::tests::raw_header, ByteCursor};

    fn header_of(data: &[u8]) -> Header {
        Header::read(&mut ByteCursor::new(data)).unwrap()
    }

    fn with_word(mut data: Vec<u8>, offset: usize, value: u32) -> Vec<u8> {
        data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        data
    }

    #[test]
    fn test_valid_header() {
        let data = raw_header(b"035", 0x90);
        check_header(&header_of(&data)).unwrap();
    }

    #[test]
    fn test_file_size_too_small() {
        let data = raw_header(b"035", 0x20);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::FileSizeAtLeast {
                actual: 0x20,
                expected: 0x70
            }))
        ));
    }

    #[test]
    fn test_bad_header_size() {
        let data = with_word(raw_header(b"035", 0x90), 36, 0x78);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::BadHeaderSize { size: 0x78, .. }))
        ));
    }

    #[test]
    fn test_bad_endian_tag() {
        let data = with_word(raw_header(b"035", 0x90), 40, 0x78563412);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::UnexpectedEndianess(0x78563412)))
        ));
    }

    #[test]
    fn test_section_beyond_file_size() {
        // 3 strings at 0x70 need 12 bytes
        let data = raw_header(b"035", 0x78);
        match check_header(&header_of(&data)) {
            Err(DexError::InvalidHeader(HeaderError::BadSection { end, section, .. })) => {
                assert_eq!(end, 0x7c);
                assert_eq!(section, "string-ids");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_section_inside_header() {
        // move the string ids into the header
        let data = with_word(raw_header(b"035", 0x90), 60, 0x20);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::BadOffsetInHeader { offset: 0x20, .. }))
        ));
    }

    #[test]
    fn test_offset_too_large() {
        let data = with_word(raw_header(b"035", 0x90), 68, 0x1000);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::BadOffsetTooLarge { offset: 0x1000, .. }))
        ));
    }

    #[test]
    fn test_overflowing_section_is_rejected() {
        // huge method count must not wrap around
        let data = with_word(raw_header(b"035", 0x90), 88, u32::MAX);
        assert!(matches!(
            check_header(&header_of(&data)),
            Err(DexError::InvalidHeader(HeaderError::BadSection { .. }))
        ));
    }

    #[test]
    fn test_integrity_presets() {
        let mut data = raw_header(b"035", 0x70);
        let signature = calculate_signature(&data);
        data[12..32].copy_from_slice(&signature);
        let checksum = calculate_checksum(&data).unwrap();
        data[8..12].copy_from_slice(&checksum.to_le_bytes());

        let header = header_of(&data);
        verify_integrity(&data, &header, VerifyPreset::All).unwrap();

        // corrupt a byte covered by both checks
        data[0x50] ^= 0xff;
        verify_integrity(&data, &header, VerifyPreset::None).unwrap();
        assert!(matches!(
            verify_integrity(&data, &header, VerifyPreset::ChecksumOnly),
            Err(DexError::BadChecksum { expected, .. }) if expected == checksum
        ));
    }

    #[test]
    fn test_bad_signature() {
        let mut data = raw_header(b"035", 0x70);
        let checksum = calculate_checksum(&data).unwrap();
        data[8..12].copy_from_slice(&checksum.to_le_bytes());
        let header = header_of(&data);

        verify_integrity(&data, &header, VerifyPreset::ChecksumOnly).unwrap();
        match verify_integrity(&data, &header, VerifyPreset::All) {
            Err(DexError::BadSignature { expected, .. }) => {
                assert_eq!(expected, "ab".repeat(20));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
