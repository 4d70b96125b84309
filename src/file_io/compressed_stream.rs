//! Compressed stream - seekable decompressed view of a parent stream

use tracing::debug;

use super::transform::TransformStream;
use super::{FileIo, ParentStream, Whence};
use crate::compression::{Decompressor, DecompressorRegistry};
use crate::config::VfsConfig;
use crate::error::Result;

/// Decompressed bytes of a zlib/DEFLATE/bzip2/LZMA/XZ parent stream
pub struct CompressedStream {
    inner: TransformStream<Box<dyn Decompressor>>,
    compression_method: String,
}

impl CompressedStream {
    /// Fails with `NotRegistered` if the method has no decompressor
    pub fn new(
        parent: ParentStream,
        compression_method: &str,
        registry: &DecompressorRegistry,
        config: &VfsConfig,
    ) -> Result<Self> {
        let constructor = registry.constructor(compression_method)?;
        let inner = TransformStream::new("compressed stream", parent, constructor, config.source_read_size)?;
        debug!(method = %compression_method, "Opened compressed stream");
        Ok(Self {
            inner,
            compression_method: compression_method.to_lowercase(),
        })
    }

    pub fn compression_method(&self) -> &str {
        &self.compression_method
    }
}

impl FileIo for CompressedStream {
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.inner.read(size)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.inner.seek(offset, whence)
    }

    fn offset(&self) -> Result<u64> {
        self.inner.offset()
    }

    fn size(&mut self) -> Result<u64> {
        self.inner.size()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
