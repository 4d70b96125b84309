//! Byte range of a parent stream, e.g. a partition inside a disk image

use tracing::debug;

use super::{resolve_seek, FileIo, ParentStream, Whence};
use crate::error::{Result, VfsError};

/// Maps `[range_offset, range_offset + range_size)` of the parent to `[0, size)`
///
/// The visible size is clipped to the parent's end, so a range that runs
/// past a truncated image reports what is actually there.
pub struct DataRange {
    parent: Option<ParentStream>,
    range_offset: u64,
    size: u64,
    offset: u64,
}

impl DataRange {
    pub fn new(parent: ParentStream, range_offset: u64, range_size: u64) -> Result<Self> {
        range_offset.checked_add(range_size).ok_or_else(|| {
            VfsError::PathSpec(format!(
                "DATA_RANGE: range {range_offset}+{range_size} overflows"
            ))
        })?;
        let parent_size = parent.size()?;
        let size = range_size.min(parent_size.saturating_sub(range_offset));
        if size < range_size {
            debug!(range_offset, range_size, parent_size, "Data range clipped to parent");
        }
        Ok(Self {
            parent: Some(parent),
            range_offset,
            size,
            offset: 0,
        })
    }

    fn parent(&self) -> Result<&ParentStream> {
        self.parent.as_ref().ok_or_else(|| VfsError::not_open("data range"))
    }
}

impl FileIo for DataRange {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let parent = self.parent()?;
        if self.offset >= self.size {
            return Ok(Vec::new());
        }
        let wanted = (size as u64).min(self.size - self.offset) as usize;
        let data = parent.read_at(self.range_offset + self.offset, wanted)?;
        self.offset += data.len() as u64;
        Ok(data)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.parent()?;
        self.offset = resolve_seek(self.offset, offset, whence, || Ok(self.size))?;
        Ok(self.offset)
    }

    fn offset(&self) -> Result<u64> {
        self.parent()?;
        Ok(self.offset)
    }

    fn size(&mut self) -> Result<u64> {
        self.parent()?;
        Ok(self.size)
    }

    fn close(&mut self) -> Result<()> {
        let parent = self.parent.take().ok_or_else(|| VfsError::not_open("data range"))?;
        parent.release()
    }

    fn is_open(&self) -> bool {
        self.parent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::test_support::{parent_over, temp_file};

    #[test]
    fn test_range_maps_and_clips() {
        let file = temp_file(b"0123456789abcdef");
        let mut range = DataRange::new(parent_over(&file), 4, 6).unwrap();
        assert_eq!(range.size().unwrap(), 6);
        assert_eq!(range.read(100).unwrap(), b"456789");
        assert!(range.read(1).unwrap().is_empty());

        range.seek(-3, Whence::End).unwrap();
        assert_eq!(range.read(2).unwrap(), b"78");
        range.close().unwrap();
        assert!(range.read(1).is_err());
    }

    #[test]
    fn test_range_past_parent_end() {
        let file = temp_file(b"0123456789");
        let mut range = DataRange::new(parent_over(&file), 8, 100).unwrap();
        assert_eq!(range.size().unwrap(), 2);
        assert_eq!(range.read_all().unwrap(), b"89");

        let mut empty = DataRange::new(parent_over(&file), 50, 10).unwrap();
        assert_eq!(empty.size().unwrap(), 0);
        assert!(empty.read(4).unwrap().is_empty());
    }

    #[test]
    fn test_overflowing_range_rejected() {
        let file = temp_file(b"x");
        assert!(DataRange::new(parent_over(&file), u64::MAX, 2).is_err());
    }
}
