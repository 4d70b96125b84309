//! Layer detection via magic signatures
//!
//! Looks at the leading bytes of a stream and reports which layer kinds
//! could be opened on top of it. More than one kind can match (a disk image
//! can carry both a GPT and a file system signature), so every match is
//! returned, in table order.

use serde::Serialize;
use tracing::debug;

use crate::definitions::{TypeIndicator, COMPRESSION_METHOD_BZIP2, COMPRESSION_METHOD_XZ};
use crate::error::Result;
use crate::file_io::{FileIo, Whence};

/// Bytes read from the start of a stream; covers the deepest signature offset
pub const HEADER_SIZE: usize = 4096;

// =============================================================================
// Match Structures
// =============================================================================

/// Layer category for grouping matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCategory {
    CompressedStream,
    Archive,
    StorageMedia,
    VolumeSystem,
    FileSystem,
    EncryptedVolume,
}

/// One layer kind whose signature matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureMatch {
    pub type_indicator: TypeIndicator,
    pub category: SignatureCategory,
    /// Method for COMPRESSED_STREAM matches
    pub compression_method: Option<&'static str>,
}

struct Signature {
    offset: usize,
    pattern: &'static [u8],
    type_indicator: TypeIndicator,
    category: SignatureCategory,
    compression_method: Option<&'static str>,
}

const fn signature(
    offset: usize,
    pattern: &'static [u8],
    type_indicator: TypeIndicator,
    category: SignatureCategory,
) -> Signature {
    Signature {
        offset,
        pattern,
        type_indicator,
        category,
        compression_method: None,
    }
}

const fn compressed(pattern: &'static [u8], method: &'static str) -> Signature {
    Signature {
        offset: 0,
        pattern,
        type_indicator: TypeIndicator::CompressedStream,
        category: SignatureCategory::CompressedStream,
        compression_method: Some(method),
    }
}

// =============================================================================
// Signature Table
// =============================================================================

use SignatureCategory::*;

const SIGNATURES: &[Signature] = &[
    // Compressed streams
    signature(0, &[0x1F, 0x8B, 0x08], TypeIndicator::Gzip, CompressedStream),
    compressed(b"BZh", COMPRESSION_METHOD_BZIP2),
    compressed(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], COMPRESSION_METHOD_XZ),
    // Archives
    signature(0, b"PK\x03\x04", TypeIndicator::Zip, Archive),
    signature(257, b"ustar", TypeIndicator::Tar, Archive),
    signature(0, b"070701", TypeIndicator::Cpio, Archive),
    signature(0, b"070702", TypeIndicator::Cpio, Archive),
    signature(0, b"070707", TypeIndicator::Cpio, Archive),
    signature(0, &[0xC7, 0x71], TypeIndicator::Cpio, Archive),
    // Volume systems
    signature(512, b"EFI PART", TypeIndicator::Gpt, VolumeSystem),
    signature(512, b"PM", TypeIndicator::Apm, VolumeSystem),
    // Encrypted volumes; BDE shares the NTFS offset so it goes first
    signature(3, b"-FVE-FS-", TypeIndicator::Bde, EncryptedVolume),
    signature(0, &[b'L', b'U', b'K', b'S', 0xBA, 0xBE], TypeIndicator::Luksde, EncryptedVolume),
    // File systems
    signature(3, b"NTFS    ", TypeIndicator::Ntfs, FileSystem),
    signature(54, b"FAT12   ", TypeIndicator::Fat, FileSystem),
    signature(54, b"FAT16   ", TypeIndicator::Fat, FileSystem),
    signature(82, b"FAT32   ", TypeIndicator::Fat, FileSystem),
    signature(1080, &[0x53, 0xEF], TypeIndicator::Ext, FileSystem),
    signature(0, b"XFSB", TypeIndicator::Xfs, FileSystem),
    signature(1024, b"H+", TypeIndicator::Hfs, FileSystem),
    signature(1024, b"HX", TypeIndicator::Hfs, FileSystem),
    signature(32, b"NXSB", TypeIndicator::ApfsContainer, VolumeSystem),
];

// =============================================================================
// Detection
// =============================================================================

/// Match header bytes against every known signature
///
/// A type indicator is reported once even when several of its patterns
/// match (FAT12 and FAT16 cannot both be present, but cpio variants can
/// overlap with other table rows).
pub fn detect_signatures(header: &[u8]) -> Vec<SignatureMatch> {
    let mut matches: Vec<SignatureMatch> = Vec::new();
    for sig in SIGNATURES {
        let end = sig.offset + sig.pattern.len();
        if header.len() < end || header[sig.offset..end] != *sig.pattern {
            continue;
        }
        if matches.iter().any(|m| m.type_indicator == sig.type_indicator) {
            continue;
        }
        matches.push(SignatureMatch {
            type_indicator: sig.type_indicator,
            category: sig.category,
            compression_method: sig.compression_method,
        });
    }
    matches
}

pub struct Analyzer;

impl Analyzer {
    /// Detect layer kinds at the start of `file_io`
    ///
    /// The stream's current offset is restored afterwards.
    pub fn detect(file_io: &mut dyn FileIo) -> Result<Vec<SignatureMatch>> {
        let saved = file_io.offset()?;
        file_io.seek(0, Whence::Set)?;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        while header.len() < HEADER_SIZE {
            let chunk = file_io.read(HEADER_SIZE - header.len())?;
            if chunk.is_empty() {
                break;
            }
            header.extend_from_slice(&chunk);
        }

        let restore = i64::try_from(saved).unwrap_or(i64::MAX);
        file_io.seek(restore, Whence::Set)?;

        let matches = detect_signatures(&header);
        debug!(
            header_bytes = header.len(),
            matches = ?matches.iter().map(|m| m.type_indicator).collect::<Vec<_>>(),
            "Signature scan"
        );
        Ok(matches)
    }

    /// First match of the given category, if any
    pub fn detect_category(file_io: &mut dyn FileIo, category: SignatureCategory) -> Result<Option<SignatureMatch>> {
        Ok(Self::detect(file_io)?.into_iter().find(|m| m.category == category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::test_data;
    use crate::file_io::test_support::temp_file;
    use crate::file_io::OsFile;

    fn at(offset: usize, pattern: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; 2048];
        header[offset..offset + pattern.len()].copy_from_slice(pattern);
        header
    }

    fn kinds(header: &[u8]) -> Vec<TypeIndicator> {
        detect_signatures(header).into_iter().map(|m| m.type_indicator).collect()
    }

    #[test]
    fn test_compressed_streams() {
        let data = test_data::sample(1000);
        let bz = detect_signatures(&test_data::bzip2(&data));
        assert_eq!(bz.len(), 1);
        assert_eq!(bz[0].type_indicator, TypeIndicator::CompressedStream);
        assert_eq!(bz[0].compression_method, Some("bzip2"));

        let xz = detect_signatures(&test_data::xz(&data));
        assert_eq!(xz[0].compression_method, Some("xz"));

        let gz = detect_signatures(&crate::gzip::test_data::gzip_member(&data));
        assert_eq!(gz[0].type_indicator, TypeIndicator::Gzip);
        assert_eq!(gz[0].category, SignatureCategory::CompressedStream);
        assert!(gz[0].compression_method.is_none());
    }

    #[test]
    fn test_offset_signatures() {
        assert_eq!(kinds(&at(257, b"ustar")), vec![TypeIndicator::Tar]);
        assert_eq!(kinds(&at(512, b"EFI PART")), vec![TypeIndicator::Gpt]);
        assert_eq!(kinds(&at(3, b"NTFS    ")), vec![TypeIndicator::Ntfs]);
        assert_eq!(kinds(&at(82, b"FAT32   ")), vec![TypeIndicator::Fat]);
        assert_eq!(kinds(&at(1080, &[0x53, 0xEF])), vec![TypeIndicator::Ext]);
        assert_eq!(kinds(&at(1024, b"H+")), vec![TypeIndicator::Hfs]);
        assert_eq!(kinds(&at(32, b"NXSB")), vec![TypeIndicator::ApfsContainer]);
        assert_eq!(kinds(&at(3, b"-FVE-FS-")), vec![TypeIndicator::Bde]);
        assert_eq!(kinds(b"070701rest"), vec![TypeIndicator::Cpio]);
    }

    #[test]
    fn test_short_and_unknown_headers() {
        assert!(detect_signatures(&[]).is_empty());
        assert!(detect_signatures(&[0x53]).is_empty());
        assert!(detect_signatures(&[0u8; 4096]).is_empty());
        // Truncated before the EXT offset
        assert!(kinds(&at(512, b"PM")[..600]).contains(&TypeIndicator::Apm));
    }

    #[test]
    fn test_detect_restores_offset() {
        let mut data = vec![0u8; 4096];
        data[512..520].copy_from_slice(b"EFI PART");
        data[1080..1082].copy_from_slice(&[0x53, 0xEF]);
        let file = temp_file(&data);
        let mut io = OsFile::open(file.path()).unwrap();
        io.seek(100, Whence::Set).unwrap();

        let matches = Analyzer::detect(&mut io).unwrap();
        assert_eq!(
            matches.iter().map(|m| m.type_indicator).collect::<Vec<_>>(),
            vec![TypeIndicator::Gpt, TypeIndicator::Ext]
        );
        assert_eq!(io.offset().unwrap(), 100);

        let fs = Analyzer::detect_category(&mut io, SignatureCategory::FileSystem).unwrap();
        assert_eq!(fs.unwrap().type_indicator, TypeIndicator::Ext);
    }
}
