//! Gzip on-disk structures (RFC 1952)

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Member signature
pub const GZIP_SIGNATURE: [u8; 2] = [0x1f, 0x8b];

/// The only compression method gzip defines
pub const GZIP_COMPRESSION_METHOD_DEFLATE: u8 = 8;

/// Footer: CRC32 + ISIZE
pub const GZIP_FOOTER_SIZE: usize = 8;

// Header flag bits
pub const FLAG_FTEXT: u8 = 0x01;
pub const FLAG_FHCRC: u8 = 0x02;
pub const FLAG_FEXTRA: u8 = 0x04;
pub const FLAG_FNAME: u8 = 0x08;
pub const FLAG_FCOMMENT: u8 = 0x10;

/// Fixed and optional header fields of one member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GzipMemberHeader {
    pub flags: u8,
    /// Seconds since the Unix epoch; 0 means not set
    pub modification_time: u32,
    pub extra_flags: u8,
    pub operating_system: u8,
    pub extra_field: Option<Vec<u8>>,
    /// Original file name, decoded as ISO-8859-1
    pub original_filename: Option<String>,
    /// Comment, decoded as ISO-8859-1
    pub comment: Option<String>,
    pub header_crc16: Option<u16>,
}

impl GzipMemberHeader {
    pub fn is_text(&self) -> bool {
        self.flags & FLAG_FTEXT != 0
    }

    pub fn modification_datetime(&self) -> Option<DateTime<Utc>> {
        if self.modification_time == 0 {
            return None;
        }
        Utc.timestamp_opt(i64::from(self.modification_time), 0).single()
    }

    /// Operating system name for the header's OS tag
    pub fn operating_system_name(&self) -> &'static str {
        match self.operating_system {
            0 => "FAT",
            1 => "Amiga",
            2 => "VMS",
            3 => "Unix",
            4 => "VM/CMS",
            5 => "Atari TOS",
            6 => "HPFS",
            7 => "Macintosh",
            8 => "Z-System",
            9 => "CP/M",
            10 => "TOPS-20",
            11 => "NTFS",
            12 => "QDOS",
            13 => "Acorn RISCOS",
            _ => "unknown",
        }
    }
}

/// Trailer of a complete member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GzipFooter {
    pub crc32: u32,
    /// Decoded size modulo 2^32
    pub uncompressed_size: u32,
}

impl GzipFooter {
    pub fn from_bytes(bytes: &[u8; GZIP_FOOTER_SIZE]) -> Self {
        Self {
            crc32: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            uncompressed_size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Outcome of checking one member against its footer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Ok,
    Mismatch,
    NoFooter,
}

/// Per-member result of [`super::GzipFile::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberVerification {
    pub index: usize,
    pub member_start_offset: u64,
    pub status: VerifyStatus,
    pub expected_crc32: Option<u32>,
    pub computed_crc32: u32,
    pub expected_size: Option<u32>,
    pub computed_size: u64,
}
