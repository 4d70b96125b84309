//! OS file - the root of every chain

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{resolve_seek, FileIo, Whence};
use crate::error::{Result, VfsError};

/// Regular file opened read-only
pub struct OsFile {
    file: Option<File>,
    path: PathBuf,
    size: u64,
    offset: u64,
}

impl OsFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| VfsError::from_io(format!("unable to stat {}", path.display()), e))?;
        if metadata.is_dir() {
            return Err(VfsError::io(format!(
                "{} is a directory, not a file",
                path.display()
            )));
        }
        let file = File::open(path)
            .map_err(|e| VfsError::from_io(format!("unable to open {}", path.display()), e))?;

        debug!(path = %path.display(), size = metadata.len(), "Opened OS file");
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            size: metadata.len(),
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileIo for OsFile {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or_else(|| VfsError::not_open("OS file"))?;
        if size == 0 || self.offset >= self.size {
            return Ok(Vec::new());
        }
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| VfsError::from_io(format!("seek in {}", self.path.display()), e))?;

        let wanted = (size as u64).min(self.size - self.offset);
        let mut buf = Vec::with_capacity(wanted as usize);
        file.by_ref()
            .take(wanted)
            .read_to_end(&mut buf)
            .map_err(|e| VfsError::from_io(format!("read from {}", self.path.display()), e))?;
        self.offset += buf.len() as u64;
        Ok(buf)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        if self.file.is_none() {
            return Err(VfsError::not_open("OS file"));
        }
        self.offset = resolve_seek(self.offset, offset, whence, || Ok(self.size))?;
        Ok(self.offset)
    }

    fn offset(&self) -> Result<u64> {
        if self.file.is_none() {
            return Err(VfsError::not_open("OS file"));
        }
        Ok(self.offset)
    }

    fn size(&mut self) -> Result<u64> {
        if self.file.is_none() {
            return Err(VfsError::not_open("OS file"));
        }
        Ok(self.size)
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_none() {
            return Err(VfsError::not_open("OS file"));
        }
        debug!(path = %self.path.display(), "Closed OS file");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::file_io::test_support::temp_file;
    use tempfile::TempDir;

    #[test]
    fn test_read_seek_close() {
        let file = temp_file(b"forensic");
        let mut io = OsFile::open(file.path()).unwrap();
        assert_eq!(io.size().unwrap(), 8);
        assert_eq!(io.read(4).unwrap(), b"fore");
        assert_eq!(io.offset().unwrap(), 4);
        assert_eq!(io.seek(-2, Whence::End).unwrap(), 6);
        assert_eq!(io.read(10).unwrap(), b"ic");
        assert!(io.read(10).unwrap().is_empty());

        assert!(io.seek(-100, Whence::Current).is_err());
        assert_eq!(io.offset().unwrap(), 8);

        io.close().unwrap();
        assert!(!io.is_open());
        assert_eq!(io.read(1).unwrap_err().kind(), ErrorKind::Io);
        assert!(io.close().is_err());
    }

    #[test]
    fn test_directory_and_missing_rejected() {
        let dir = TempDir::new().unwrap();
        let err = OsFile::open(dir.path()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
        let err = OsFile::open(dir.path().join("missing.raw")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
