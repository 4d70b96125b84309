//! `std::io::Read + Seek` over a shared stream, for back ends that take std readers

use std::io::{self, Read, Seek, SeekFrom};

use super::{lock, FileIo, FileIoHandle, Whence};

pub struct FileIoReader {
    handle: FileIoHandle,
}

impl FileIoReader {
    pub fn new(handle: FileIoHandle) -> Self {
        Self { handle }
    }

    pub fn into_inner(self) -> FileIoHandle {
        self.handle
    }
}

fn to_io_error(err: crate::error::VfsError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl Read for FileIoReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut io = lock(&self.handle).map_err(to_io_error)?;
        let data = io.read(buf.len()).map_err(to_io_error)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl Seek for FileIoReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
                (offset, Whence::Set)
            }
            SeekFrom::Current(offset) => (offset, Whence::Current),
            SeekFrom::End(offset) => (offset, Whence::End),
        };
        let mut io = lock(&self.handle).map_err(to_io_error)?;
        io.seek(offset, whence).map_err(to_io_error)
    }
}
