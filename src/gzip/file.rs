//! Gzip file - the concatenated decoded content of every member

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use tracing::{debug, info, warn};

use super::member::{checksum_body, GzipMember};
use super::types::{MemberVerification, VerifyStatus};
use crate::config::VfsConfig;
use crate::error::{Result, VfsError};
use crate::file_io::{resolve_seek, FileIo, ParentStream, StreamMetadata, Whence};

/// Multi-member gzip stream presented as one decoded stream
pub struct GzipFile {
    parent: Option<ParentStream>,
    members: Vec<GzipMember>,
    /// Decoded end offset -> member index; zero-size members are left out
    members_by_end_offset: BTreeMap<u64, usize>,
    uncompressed_size: u64,
    current_offset: u64,
}

impl GzipFile {
    /// Parse every member of the parent stream
    ///
    /// The first member must start with a valid header. After that, data
    /// that is not a gzip member ends the scan with a warning. A truncated
    /// member ends the scan too.
    pub fn open(parent: ParentStream, config: &VfsConfig) -> Result<Self> {
        let compressed_size = parent.size()?;
        if compressed_size == 0 {
            return Err(VfsError::Format("empty gzip stream".into()));
        }

        let mut members: Vec<GzipMember> = Vec::new();
        let mut members_by_end_offset = BTreeMap::new();
        let mut offset = 0u64;
        let mut uncompressed_offset = 0u64;

        while offset < compressed_size {
            let member = match GzipMember::parse(
                &parent,
                offset,
                uncompressed_offset,
                config.gzip_cache_size,
                config.verify_gzip_footers,
            ) {
                Ok(member) => member,
                Err(e) if !members.is_empty() && e.kind() == crate::error::ErrorKind::Format => {
                    warn!(
                        offset,
                        trailing = compressed_size - offset,
                        error = %e,
                        "Ignoring trailing data after last gzip member"
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            offset = member.member_end_offset;
            uncompressed_offset = member.uncompressed_data_end_offset();
            if member.uncompressed_data_size > 0 {
                members_by_end_offset.insert(uncompressed_offset, members.len());
            }
            let truncated = member.footer.is_none();
            members.push(member);
            if truncated {
                break;
            }
        }

        if crate::logging::is_debug_enabled() {
            for (index, member) in members.iter().enumerate() {
                debug!(
                    index,
                    start = member.member_start_offset,
                    end = member.member_end_offset,
                    decoded_size = member.uncompressed_data_size,
                    name = member.header.original_filename.as_deref().unwrap_or(""),
                    "Gzip member"
                );
            }
        }
        info!(
            members = members.len(),
            compressed_size,
            uncompressed_size = uncompressed_offset,
            "Opened gzip stream"
        );
        Ok(Self {
            parent: Some(parent),
            members,
            members_by_end_offset,
            uncompressed_size: uncompressed_offset,
            current_offset: 0,
        })
    }

    pub fn members(&self) -> &[GzipMember] {
        &self.members
    }

    /// Index of the member holding decoded byte `offset`
    pub fn member_for_offset(&self, offset: u64) -> Option<usize> {
        self.members_by_end_offset
            .range((Excluded(offset), Unbounded))
            .next()
            .map(|(_, &index)| index)
    }

    fn parent(&self) -> Result<&ParentStream> {
        self.parent.as_ref().ok_or_else(|| VfsError::not_open("gzip file"))
    }

    /// Re-decode every member and compare CRC32 and size with its footer
    pub fn verify(&self) -> Result<Vec<MemberVerification>> {
        let parent = self.parent()?;
        let mut results = Vec::with_capacity(self.members.len());
        for (index, member) in self.members.iter().enumerate() {
            let (computed_crc32, computed_size) = checksum_body(parent, member)?;
            let status = match member.footer {
                None => VerifyStatus::NoFooter,
                Some(footer)
                    if footer.crc32 == computed_crc32
                        && footer.uncompressed_size == computed_size as u32 =>
                {
                    VerifyStatus::Ok
                }
                Some(_) => VerifyStatus::Mismatch,
            };
            debug!(index, ?status, "Verified gzip member");
            results.push(MemberVerification {
                index,
                member_start_offset: member.member_start_offset,
                status,
                expected_crc32: member.footer.map(|f| f.crc32),
                computed_crc32,
                expected_size: member.footer.map(|f| f.uncompressed_size),
                computed_size,
            });
        }
        Ok(results)
    }
}

impl FileIo for GzipFile {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let parent = self
            .parent
            .as_ref()
            .ok_or_else(|| VfsError::not_open("gzip file"))?;
        if self.current_offset >= self.uncompressed_size || size == 0 {
            return Ok(Vec::new());
        }

        let end = self
            .current_offset
            .saturating_add(size as u64)
            .min(self.uncompressed_size);
        let mut output = Vec::with_capacity((end - self.current_offset) as usize);
        while self.current_offset < end {
            let Some(index) = self
                .members_by_end_offset
                .range((Excluded(self.current_offset), Unbounded))
                .next()
                .map(|(_, &index)| index)
            else {
                break;
            };
            let member = &mut self.members[index];
            let member_offset = self.current_offset - member.uncompressed_data_offset;
            let wanted = (end - self.current_offset) as usize;
            let data = member.read(parent, member_offset, wanted)?;
            if data.is_empty() {
                break;
            }
            self.current_offset += data.len() as u64;
            output.extend_from_slice(&data);
        }
        Ok(output)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.parent()?;
        self.current_offset = resolve_seek(self.current_offset, offset, whence, || Ok(self.uncompressed_size))?;
        Ok(self.current_offset)
    }

    fn offset(&self) -> Result<u64> {
        self.parent()?;
        Ok(self.current_offset)
    }

    fn size(&mut self) -> Result<u64> {
        self.parent()?;
        Ok(self.uncompressed_size)
    }

    fn close(&mut self) -> Result<()> {
        let parent = self
            .parent
            .take()
            .ok_or_else(|| VfsError::not_open("gzip file"))?;
        self.members.clear();
        self.members_by_end_offset.clear();
        parent.release()
    }

    fn is_open(&self) -> bool {
        self.parent.is_some()
    }

    /// Name, time and comment of the last member, as gzip(1) reports them
    fn stream_metadata(&self) -> StreamMetadata {
        match self.members.last() {
            Some(member) => StreamMetadata {
                name: member.header.original_filename.clone(),
                modification_time: member.header.modification_datetime(),
                comment: member.header.comment.clone(),
            },
            None => StreamMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::test_data::sample;
    use crate::error::ErrorKind;
    use crate::file_io::test_support::{parent_over, temp_file};
    use crate::gzip::test_data::{gzip_member, gzip_member_with_header};

    fn open(bytes: &[u8], config: &VfsConfig) -> (tempfile::NamedTempFile, GzipFile) {
        let file = temp_file(bytes);
        let gzip = GzipFile::open(parent_over(&file), config).unwrap();
        (file, gzip)
    }

    #[test]
    fn test_two_member_scenario() {
        let mut bytes = gzip_member(b"AAAA");
        bytes.extend_from_slice(&gzip_member(b"BBBBBB"));
        let (_file, mut gzip) = open(&bytes, &VfsConfig::default());

        assert_eq!(gzip.members().len(), 2);
        assert_eq!(gzip.size().unwrap(), 10);
        gzip.seek(2, Whence::Set).unwrap();
        assert_eq!(gzip.read(6).unwrap(), b"AABBBB");
        assert_eq!(gzip.offset().unwrap(), 8);
        assert_eq!(gzip.read(100).unwrap(), b"BB");
        assert!(gzip.read(1).unwrap().is_empty());
    }

    #[test]
    fn test_member_for_offset_boundaries() {
        let contents: [&[u8]; 4] = [b"abc", b"", b"defgh", b"i"];
        let mut bytes = Vec::new();
        for content in contents {
            bytes.extend_from_slice(&gzip_member(content));
        }
        let (_file, mut gzip) = open(&bytes, &VfsConfig::default());

        assert_eq!(gzip.members().len(), 4);
        assert_eq!(gzip.size().unwrap(), 9);
        let expected = [0, 0, 0, 2, 2, 2, 2, 2, 3];
        for (offset, &index) in expected.iter().enumerate() {
            assert_eq!(gzip.member_for_offset(offset as u64), Some(index), "offset {offset}");
        }
        assert_eq!(gzip.member_for_offset(9), None);
        assert_eq!(gzip.read_all().unwrap(), b"abcdefghi");
    }

    #[test]
    fn test_many_members_with_small_cache() {
        let config = VfsConfig::default().with_gzip_cache_size(1000);
        let parts: Vec<Vec<u8>> = (0..5).map(|i| sample(30_000 + i * 777)).collect();
        let mut bytes = Vec::new();
        let mut expected = Vec::new();
        for part in &parts {
            bytes.extend_from_slice(&gzip_member(part));
            expected.extend_from_slice(part);
        }
        let (_file, mut gzip) = open(&bytes, &config);
        assert_eq!(gzip.size().unwrap(), expected.len() as u64);

        for offset in [0u64, 29_999, 30_000, 61_000, 100_000, expected.len() as u64 - 5] {
            gzip.seek(offset as i64, Whence::Set).unwrap();
            let got = gzip.read(4000).unwrap();
            let start = offset as usize;
            let end = (start + 4000).min(expected.len());
            assert!(got == expected[start..end], "offset {offset}");
        }
        assert!(gzip.read_all().unwrap() == expected);
    }

    #[test]
    fn test_truncated_footer_last_member() {
        let mut bytes = gzip_member(b"first member");
        let second = gzip_member(b"second, truncated");
        bytes.extend_from_slice(&second[..second.len() - 5]);
        let (_file, mut gzip) = open(&bytes, &VfsConfig::default());

        assert_eq!(gzip.members().len(), 2);
        assert!(gzip.members()[1].footer.is_none());
        assert_eq!(gzip.size().unwrap(), 29);
        assert_eq!(gzip.read_all().unwrap(), b"first membersecond, truncated");

        let results = gzip.verify().unwrap();
        assert_eq!(results[0].status, VerifyStatus::Ok);
        assert_eq!(results[1].status, VerifyStatus::NoFooter);
    }

    #[test]
    fn test_truncated_body_uses_decoded_count() {
        let data = sample(100_000);
        let member = gzip_member(&data);
        let (_file, mut gzip) = open(&member[..member.len() / 2], &VfsConfig::default());

        let size = gzip.size().unwrap();
        assert!(size > 0 && size < data.len() as u64);
        let decoded = gzip.read_all().unwrap();
        assert_eq!(decoded.len() as u64, size);
        assert_eq!(decoded, &data[..decoded.len()]);
    }

    #[test]
    fn test_footer_mismatch_reported_by_verify() {
        let mut bytes = gzip_member(b"checked content");
        let crc_at = bytes.len() - 8;
        bytes[crc_at] ^= 0xff;
        let (_file, gzip) = open(&bytes, &VfsConfig::default());
        let results = gzip.verify().unwrap();
        assert_eq!(results[0].status, VerifyStatus::Mismatch);
        assert_eq!(results[0].computed_crc32, crc32fast::hash(b"checked content"));
    }

    #[test]
    fn test_trailing_garbage_ignored() {
        let mut bytes = gzip_member(b"data");
        bytes.extend_from_slice(&[0u8; 512]);
        let (_file, mut gzip) = open(&bytes, &VfsConfig::default());
        assert_eq!(gzip.members().len(), 1);
        assert_eq!(gzip.read_all().unwrap(), b"data");
    }

    #[test]
    fn test_empty_and_invalid_streams_are_format_errors() {
        let file = temp_file(b"");
        let err = GzipFile::open(parent_over(&file), &VfsConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Format);

        let file = temp_file(b"plain text, not gzip");
        let err = GzipFile::open(parent_over(&file), &VfsConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_metadata_from_last_member() {
        let mut bytes = gzip_member_with_header(b"one", Some("first.log"), None, 1_000);
        bytes.extend_from_slice(&gzip_member_with_header(b"two", Some("second.log"), Some("note"), 2_000));
        let (_file, gzip) = open(&bytes, &VfsConfig::default());
        let metadata = gzip.stream_metadata();
        assert_eq!(metadata.name.as_deref(), Some("second.log"));
        assert_eq!(metadata.comment.as_deref(), Some("note"));
        assert_eq!(metadata.modification_time.unwrap().timestamp(), 2_000);

        let json: serde_json::Value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["name"], "second.log");
        assert!(json["modification_time"]
            .as_str()
            .unwrap()
            .starts_with("1970-01-01T00:33:20"));
    }

    #[test]
    fn test_close() {
        let (_file, mut gzip) = open(&gzip_member(b"x"), &VfsConfig::default());
        gzip.close().unwrap();
        assert!(!gzip.is_open());
        assert_eq!(gzip.read(1).unwrap_err().kind(), ErrorKind::Io);
    }
}
