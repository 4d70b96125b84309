//! One gzip member: header parsing, body scan and the bounded decode window

use tracing::{debug, trace, warn};

use super::types::*;
use crate::common::binary::{latin1_to_string, StreamCursor};
use crate::compression::{DeflateDecompressor, Decompressor};
use crate::error::{Result, VfsError};
use crate::file_io::ParentStream;

/// Compressed bytes read from the parent per decode step
pub(crate) const MEMBER_READ_SIZE: usize = 64 * 1024;

/// In-progress decode of the member body, kept to continue forward reads
struct DecodeState {
    decompressor: DeflateDecompressor,
    source_offset: u64,
    decoded_offset: u64,
}

/// A member of a gzip stream and its place in the decoded stream
pub struct GzipMember {
    pub header: GzipMemberHeader,
    /// None when the member is truncated before or inside its footer
    pub footer: Option<GzipFooter>,
    /// Parent offset of the member signature
    pub member_start_offset: u64,
    /// Parent offset just past the footer (or the end of data when truncated)
    pub member_end_offset: u64,
    /// Parent range of the DEFLATE body
    pub compressed_data_offset: u64,
    pub compressed_data_end_offset: u64,
    /// Logical offset of the member's first decoded byte
    pub uncompressed_data_offset: u64,
    pub uncompressed_data_size: u64,

    cache: Vec<u8>,
    cache_start: u64,
    cache_size: usize,
    state: Option<DecodeState>,
}

/// Body scan result
struct BodyScan {
    end_offset: u64,
    decoded_size: u64,
    crc32: u32,
    complete: bool,
    eager: Option<Vec<u8>>,
}

impl GzipMember {
    /// Parse the member starting at `start` in the parent
    ///
    /// The whole body is decoded once to find where it ends and how much it
    /// decodes to. When that fits in `cache_size` the decoded bytes are kept
    /// and later reads never touch the parent again.
    pub fn parse(
        parent: &ParentStream,
        start: u64,
        uncompressed_data_offset: u64,
        cache_size: usize,
        verify_footer: bool,
    ) -> Result<Self> {
        let header_start = start;
        let mut cursor = StreamCursor::new(parent, start);

        let signature = cursor.read_bytes(2)?;
        if signature != GZIP_SIGNATURE {
            return Err(VfsError::Format(format!(
                "invalid gzip signature at offset {header_start}: {}",
                hex::encode(&signature)
            )));
        }
        let method = cursor.read_u8()?;
        if method != GZIP_COMPRESSION_METHOD_DEFLATE {
            return Err(VfsError::Format(format!(
                "unsupported gzip compression method {method} at offset {header_start}"
            )));
        }

        let mut header = GzipMemberHeader {
            flags: cursor.read_u8()?,
            modification_time: cursor.read_u32_le()?,
            extra_flags: cursor.read_u8()?,
            operating_system: cursor.read_u8()?,
            ..Default::default()
        };
        if header.flags & FLAG_FEXTRA != 0 {
            let length = cursor.read_u16_le()? as usize;
            header.extra_field = Some(cursor.read_bytes(length)?);
        }
        if header.flags & FLAG_FNAME != 0 {
            header.original_filename = Some(latin1_to_string(&cursor.read_cstring()?));
        }
        if header.flags & FLAG_FCOMMENT != 0 {
            header.comment = Some(latin1_to_string(&cursor.read_cstring()?));
        }
        if header.flags & FLAG_FHCRC != 0 {
            header.header_crc16 = Some(cursor.read_u16_le()?);
        }
        let compressed_data_offset = cursor.offset();

        let scan = scan_body(parent, compressed_data_offset, cache_size)?;

        let (footer, member_end_offset) = if scan.complete {
            let bytes = parent.read_at(scan.end_offset, GZIP_FOOTER_SIZE)?;
            match <[u8; GZIP_FOOTER_SIZE]>::try_from(bytes.as_slice()) {
                Ok(raw) => (Some(GzipFooter::from_bytes(&raw)), scan.end_offset + GZIP_FOOTER_SIZE as u64),
                Err(_) => {
                    warn!(offset = scan.end_offset, available = bytes.len(), "Gzip member footer truncated");
                    (None, scan.end_offset + bytes.len() as u64)
                }
            }
        } else {
            warn!(offset = header_start, decoded = scan.decoded_size, "Gzip member body truncated");
            (None, scan.end_offset)
        };

        if let (Some(footer), true) = (footer, verify_footer) {
            if footer.uncompressed_size != scan.decoded_size as u32 || footer.crc32 != scan.crc32 {
                warn!(
                    offset = header_start,
                    expected_crc32 = footer.crc32,
                    computed_crc32 = scan.crc32,
                    expected_size = footer.uncompressed_size,
                    computed_size = scan.decoded_size,
                    "Gzip member footer mismatch"
                );
            }
        }

        debug!(
            offset = header_start,
            compressed = scan.end_offset - compressed_data_offset,
            uncompressed = scan.decoded_size,
            cached = scan.eager.is_some(),
            "Parsed gzip member"
        );

        Ok(Self {
            header,
            footer,
            member_start_offset: header_start,
            member_end_offset,
            compressed_data_offset,
            compressed_data_end_offset: scan.end_offset,
            uncompressed_data_offset,
            uncompressed_data_size: scan.decoded_size,
            cache: scan.eager.unwrap_or_default(),
            cache_start: 0,
            cache_size: cache_size.max(1),
            state: None,
        })
    }

    /// Logical offset just past the member's last decoded byte
    pub fn uncompressed_data_end_offset(&self) -> u64 {
        self.uncompressed_data_offset + self.uncompressed_data_size
    }

    /// Read up to `size` decoded bytes at a member-relative offset
    pub fn read(&mut self, parent: &ParentStream, offset: u64, size: usize) -> Result<Vec<u8>> {
        if offset >= self.uncompressed_data_size {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(size as u64).min(self.uncompressed_data_size);
        let mut output = Vec::with_capacity((end - offset) as usize);
        let mut position = offset;
        while position < end {
            let cache_end = self.cache_start + self.cache.len() as u64;
            if position >= self.cache_start && position < cache_end {
                let start = (position - self.cache_start) as usize;
                let count = ((end - position) as usize).min(self.cache.len() - start);
                output.extend_from_slice(&self.cache[start..start + count]);
                position += count as u64;
                continue;
            }
            if !self.load_window(parent, position)? {
                break;
            }
        }
        Ok(output)
    }

    /// Refill the cache window starting at member-relative `target`
    ///
    /// Continues the in-progress decode when it has not passed the target,
    /// otherwise restarts from the start of the body.
    fn load_window(&mut self, parent: &ParentStream, target: u64) -> Result<bool> {
        let restart = self
            .state
            .as_ref()
            .map_or(true, |state| state.decoded_offset > target);
        if restart {
            trace!(member = self.member_start_offset, target, "Restarting gzip member decode");
            self.state = Some(DecodeState {
                decompressor: DeflateDecompressor::new(),
                source_offset: self.compressed_data_offset,
                decoded_offset: 0,
            });
        }
        let Some(state) = self.state.as_mut() else {
            return Ok(false);
        };

        self.cache.clear();
        self.cache_start = target;
        while self.cache.len() < self.cache_size
            && state.source_offset < self.compressed_data_end_offset
            && !state.decompressor.is_finished()
        {
            let wanted = (self.compressed_data_end_offset - state.source_offset).min(MEMBER_READ_SIZE as u64);
            let chunk = parent.read_at(state.source_offset, wanted as usize)?;
            if chunk.is_empty() {
                break;
            }
            let (decoded, leftover) = state
                .decompressor
                .decompress(&chunk)
                .map_err(|e| e.at_offset(state.source_offset))?;
            state.source_offset += (chunk.len() - leftover.len()) as u64;

            let run_start = state.decoded_offset;
            state.decoded_offset += decoded.len() as u64;
            if state.decoded_offset <= target {
                continue;
            }
            let skip = target.saturating_sub(run_start) as usize;
            self.cache.extend_from_slice(&decoded[skip..]);
        }
        Ok(!self.cache.is_empty())
    }
}

/// Decode a member body from `offset` to its end marker or the end of data
fn scan_body(parent: &ParentStream, offset: u64, cache_size: usize) -> Result<BodyScan> {
    let mut decompressor = DeflateDecompressor::new();
    let mut hasher = crc32fast::Hasher::new();
    let mut source_offset = offset;
    let mut decoded_size = 0u64;
    let mut eager = Some(Vec::new());

    while !decompressor.is_finished() {
        let chunk = parent.read_at(source_offset, MEMBER_READ_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        let (decoded, leftover) = decompressor
            .decompress(&chunk)
            .map_err(|e| e.at_offset(source_offset))?;
        source_offset += (chunk.len() - leftover.len()) as u64;
        decoded_size += decoded.len() as u64;
        hasher.update(&decoded);

        if let Some(buffer) = eager.as_mut() {
            if buffer.len() + decoded.len() <= cache_size {
                buffer.extend_from_slice(&decoded);
            } else {
                eager = None;
            }
        }
    }

    Ok(BodyScan {
        end_offset: source_offset,
        decoded_size,
        crc32: hasher.finalize(),
        complete: decompressor.is_finished(),
        eager,
    })
}

/// Decode a member body again and compute (CRC32, size)
pub(crate) fn checksum_body(parent: &ParentStream, member: &GzipMember) -> Result<(u32, u64)> {
    let mut decompressor = DeflateDecompressor::new();
    let mut hasher = crc32fast::Hasher::new();
    let mut source_offset = member.compressed_data_offset;
    let mut size = 0u64;
    while source_offset < member.compressed_data_end_offset && !decompressor.is_finished() {
        let wanted = (member.compressed_data_end_offset - source_offset).min(MEMBER_READ_SIZE as u64);
        let chunk = parent.read_at(source_offset, wanted as usize)?;
        if chunk.is_empty() {
            break;
        }
        let (decoded, leftover) = decompressor
            .decompress(&chunk)
            .map_err(|e| e.at_offset(source_offset))?;
        source_offset += (chunk.len() - leftover.len()) as u64;
        size += decoded.len() as u64;
        hasher.update(&decoded);
    }
    Ok((hasher.finalize(), size))
}
