// Shared binary reading utilities for on-disk structure parsers
//
// Provides consistent little-endian reads over a parent stream, buffered so
// byte-sized header fields do not each cost a locked seek + read.

use crate::error::{Result, VfsError};
use crate::file_io::ParentStream;

/// Bytes fetched from the parent per refill
const CURSOR_FILL_SIZE: usize = 4096;

// =============================================================================
// StreamCursor - sequential reads from an absolute offset
// =============================================================================

/// Forward-only reader over a parent stream starting at an absolute offset
pub(crate) struct StreamCursor<'a> {
    source: &'a ParentStream,
    offset: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
}

impl<'a> StreamCursor<'a> {
    pub fn new(source: &'a ParentStream, offset: u64) -> Self {
        Self {
            source,
            offset,
            buffer: Vec::new(),
            buffer_start: offset,
        }
    }

    /// Absolute offset of the next byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Buffered bytes from the current offset on, refilling once if empty
    fn available(&mut self) -> Result<&[u8]> {
        let buffer_end = self.buffer_start + self.buffer.len() as u64;
        if self.offset >= buffer_end || self.offset < self.buffer_start {
            self.buffer = self.source.read_at(self.offset, CURSOR_FILL_SIZE)?;
            self.buffer_start = self.offset;
        }
        let start = (self.offset - self.buffer_start) as usize;
        Ok(&self.buffer[start.min(self.buffer.len())..])
    }

    /// Read up to `length` bytes; short only at end of data
    pub fn try_read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(length);
        while out.len() < length {
            let available = self.available()?;
            if available.is_empty() {
                break;
            }
            let count = available.len().min(length - out.len());
            out.extend_from_slice(&available[..count]);
            self.offset += count as u64;
        }
        Ok(out)
    }

    /// Read exactly `length` bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let start = self.offset;
        let data = self.try_read_bytes(length)?;
        if data.len() < length {
            return Err(VfsError::Format(format!(
                "unexpected end of data at offset {start}: wanted {length} bytes, got {}",
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a NUL-terminated byte string; the terminator is consumed, not returned
    pub fn read_cstring(&mut self) -> Result<Vec<u8>> {
        let start = self.offset;
        let mut out = Vec::new();
        loop {
            let available = self.available()?;
            if available.is_empty() {
                return Err(VfsError::Format(format!(
                    "unterminated string starting at offset {start}"
                )));
            }
            match available.iter().position(|&b| b == 0) {
                Some(end) => {
                    out.extend_from_slice(&available[..end]);
                    self.offset += end as u64 + 1;
                    return Ok(out);
                }
                None => {
                    let count = available.len();
                    out.extend_from_slice(available);
                    self.offset += count as u64;
                }
            }
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Decode ISO-8859-1 bytes; every byte maps to the code point of the same value
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::test_support::{parent_over, temp_file};

    #[test]
    fn test_read_integers() {
        let mut data = vec![0x42, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        data.extend_from_slice(b"name\x00rest");
        let file = temp_file(&data);
        let parent = parent_over(&file);
        let mut cursor = StreamCursor::new(&parent, 0);

        assert_eq!(cursor.read_u8().unwrap(), 0x42);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x12345678);
        assert_eq!(cursor.read_cstring().unwrap(), b"name");
        assert_eq!(cursor.offset(), 12);
        assert_eq!(cursor.try_read_bytes(100).unwrap(), b"rest");
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_cstring_across_refills() {
        let mut data = vec![b'x'; CURSOR_FILL_SIZE + 10];
        data.push(0);
        let file = temp_file(&data);
        let parent = parent_over(&file);
        let mut cursor = StreamCursor::new(&parent, 3);
        assert_eq!(cursor.read_cstring().unwrap().len(), CURSOR_FILL_SIZE + 7);

        let file = temp_file(b"no terminator");
        let parent = parent_over(&file);
        assert!(StreamCursor::new(&parent, 0).read_cstring().is_err());
    }

    #[test]
    fn test_latin1() {
        assert_eq!(latin1_to_string(b"caf\xe9"), "café");
        assert_eq!(latin1_to_string(b""), "");
    }
}
