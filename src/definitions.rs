//! Layer kinds and method identifiers shared across the crate

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VfsError;

// =============================================================================
// Method identifiers
// =============================================================================

pub const COMPRESSION_METHOD_BZIP2: &str = "bzip2";
pub const COMPRESSION_METHOD_DEFLATE: &str = "deflate";
pub const COMPRESSION_METHOD_LZMA: &str = "lzma";
pub const COMPRESSION_METHOD_XZ: &str = "xz";
pub const COMPRESSION_METHOD_ZLIB: &str = "zlib";

pub const ENCODING_METHOD_BASE16: &str = "base16";
pub const ENCODING_METHOD_BASE32: &str = "base32";
pub const ENCODING_METHOD_BASE64: &str = "base64";

// =============================================================================
// Type indicators
// =============================================================================

/// Kind of a layer in a path specification chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeIndicator {
    #[serde(rename = "OS")]
    Os,
    #[serde(rename = "RAW")]
    Raw,
    #[serde(rename = "DATA_RANGE")]
    DataRange,
    #[serde(rename = "COMPRESSED_STREAM")]
    CompressedStream,
    #[serde(rename = "ENCODED_STREAM")]
    EncodedStream,
    #[serde(rename = "GZIP")]
    Gzip,
    #[serde(rename = "GPT")]
    Gpt,
    #[serde(rename = "APM")]
    Apm,
    #[serde(rename = "TSK_PARTITION")]
    TskPartition,
    #[serde(rename = "TSK")]
    Tsk,
    #[serde(rename = "NTFS")]
    Ntfs,
    #[serde(rename = "EXT")]
    Ext,
    #[serde(rename = "XFS")]
    Xfs,
    #[serde(rename = "HFS")]
    Hfs,
    #[serde(rename = "FAT")]
    Fat,
    #[serde(rename = "APFS_CONTAINER")]
    ApfsContainer,
    #[serde(rename = "APFS")]
    Apfs,
    #[serde(rename = "CS")]
    CoreStorage,
    #[serde(rename = "LUKSDE")]
    Luksde,
    #[serde(rename = "BDE")]
    Bde,
    #[serde(rename = "VSHADOW")]
    Vshadow,
    #[serde(rename = "ZIP")]
    Zip,
    #[serde(rename = "TAR")]
    Tar,
    #[serde(rename = "CPIO")]
    Cpio,
}

impl TypeIndicator {
    /// Every layer kind, in declaration order
    pub const ALL: [TypeIndicator; 24] = [
        TypeIndicator::Os,
        TypeIndicator::Raw,
        TypeIndicator::DataRange,
        TypeIndicator::CompressedStream,
        TypeIndicator::EncodedStream,
        TypeIndicator::Gzip,
        TypeIndicator::Gpt,
        TypeIndicator::Apm,
        TypeIndicator::TskPartition,
        TypeIndicator::Tsk,
        TypeIndicator::Ntfs,
        TypeIndicator::Ext,
        TypeIndicator::Xfs,
        TypeIndicator::Hfs,
        TypeIndicator::Fat,
        TypeIndicator::ApfsContainer,
        TypeIndicator::Apfs,
        TypeIndicator::CoreStorage,
        TypeIndicator::Luksde,
        TypeIndicator::Bde,
        TypeIndicator::Vshadow,
        TypeIndicator::Zip,
        TypeIndicator::Tar,
        TypeIndicator::Cpio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeIndicator::Os => "OS",
            TypeIndicator::Raw => "RAW",
            TypeIndicator::DataRange => "DATA_RANGE",
            TypeIndicator::CompressedStream => "COMPRESSED_STREAM",
            TypeIndicator::EncodedStream => "ENCODED_STREAM",
            TypeIndicator::Gzip => "GZIP",
            TypeIndicator::Gpt => "GPT",
            TypeIndicator::Apm => "APM",
            TypeIndicator::TskPartition => "TSK_PARTITION",
            TypeIndicator::Tsk => "TSK",
            TypeIndicator::Ntfs => "NTFS",
            TypeIndicator::Ext => "EXT",
            TypeIndicator::Xfs => "XFS",
            TypeIndicator::Hfs => "HFS",
            TypeIndicator::Fat => "FAT",
            TypeIndicator::ApfsContainer => "APFS_CONTAINER",
            TypeIndicator::Apfs => "APFS",
            TypeIndicator::CoreStorage => "CS",
            TypeIndicator::Luksde => "LUKSDE",
            TypeIndicator::Bde => "BDE",
            TypeIndicator::Vshadow => "VSHADOW",
            TypeIndicator::Zip => "ZIP",
            TypeIndicator::Tar => "TAR",
            TypeIndicator::Cpio => "CPIO",
        }
    }

    /// Root kinds address something the OS can open directly and take no parent
    pub fn is_root(&self) -> bool {
        matches!(self, TypeIndicator::Os)
    }
}

impl fmt::Display for TypeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeIndicator {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeIndicator::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VfsError::PathSpec(format!("unknown type indicator: {s}")))
    }
}
