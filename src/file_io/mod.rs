//! Seekable byte streams - the contract every layer exposes upward
//!
//! Whatever a layer does internally (read an OS file, map a byte range,
//! inflate a compressed stream, stitch gzip members together) it presents
//! itself as a [`FileIo`]: `read`, `seek`, `offset`, `size`, `close`.
//!
//! ```text
//!   caller ──► CompressedStream ──► DataRange ──► OsFile
//!                  │ ParentStream      │ ParentStream
//!                  └ lease on parent   └ lease on parent
//! ```
//!
//! Layers built by the resolver hold their parent through a [`ParentStream`]
//! lease. Closing the layer releases the lease in the resolver context, so
//! teardown propagates toward the root.
//!
//! ## Module Structure
//! ```text
//! file_io/
//! ├── mod.rs                - FileIo trait, Whence, ParentStream
//! ├── os.rs                 - OsFile
//! ├── data_range.rs         - DataRange
//! ├── transform.rs          - seek-by-replay engine
//! ├── compressed_stream.rs  - CompressedStream
//! ├── encoded_stream.rs     - EncodedStream
//! └── reader.rs             - std::io::Read + Seek adapter
//! ```

mod compressed_stream;
mod data_range;
mod encoded_stream;
mod os;
mod reader;
pub(crate) mod transform;

pub use compressed_stream::CompressedStream;
pub use data_range::DataRange;
pub use encoded_stream::EncodedStream;
pub use os::OsFile;
pub use reader::FileIoReader;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{Result, VfsError};
use crate::path_spec::PathSpec;
use crate::resolver::{Resolver, ResolverContext};

/// Read size used by `read_all` and the std adapter
pub(crate) const DEFAULT_READ_CHUNK: usize = 1024 * 1024;

/// Reference point for [`FileIo::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the stream
    Set,
    /// From the current offset
    Current,
    /// From the end of the stream (requires the size)
    End,
}

/// Descriptive metadata a stream may carry about its content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamMetadata {
    pub name: Option<String>,
    pub modification_time: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

/// Uniform seekable byte stream
///
/// `read` returns at most `size` bytes and fewer only at end of stream.
/// Reading at or past the end yields an empty vector, not an error. A seek
/// that would land before offset 0 fails and leaves the offset unchanged.
/// Every operation on a closed stream is an `Io` error.
pub trait FileIo: Send {
    fn read(&mut self, size: usize) -> Result<Vec<u8>>;

    /// Move the offset; returns the new absolute offset
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    fn offset(&self) -> Result<u64>;

    /// Total size of the stream
    ///
    /// Takes `&mut self` because transform layers compute it lazily.
    fn size(&mut self) -> Result<u64>;

    /// Close the stream and release what it holds on its parent
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Read from offset 0 to the end
    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.seek(0, Whence::Set)?;
        let mut data = Vec::new();
        loop {
            let chunk = self.read(DEFAULT_READ_CHUNK)?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    fn stream_metadata(&self) -> StreamMetadata {
        StreamMetadata::default()
    }
}

/// Shared handle to an open stream; the resolver context hands these out
pub type FileIoHandle = Arc<Mutex<dyn FileIo>>;

/// Wrap a concrete stream in a shared handle
pub fn into_handle<F: FileIo + 'static>(io: F) -> FileIoHandle {
    Arc::new(Mutex::new(io))
}

/// Lock a shared stream, mapping a poisoned lock to an I/O error
pub fn lock(handle: &FileIoHandle) -> Result<MutexGuard<'_, dyn FileIo + 'static>> {
    handle
        .lock()
        .map_err(|_| VfsError::io("file object lock poisoned"))
}

/// Resolve a seek request to an absolute offset
///
/// `size` is only consulted for [`Whence::End`].
pub(crate) fn resolve_seek(
    current: u64,
    offset: i64,
    whence: Whence,
    size: impl FnOnce() -> Result<u64>,
) -> Result<u64> {
    let base = match whence {
        Whence::Set => 0i128,
        Whence::Current => current as i128,
        Whence::End => size()? as i128,
    };
    let target = base + offset as i128;
    if target < 0 {
        return Err(VfsError::io(format!(
            "invalid offset: {target} (seek {offset} from {whence:?})"
        )));
    }
    u64::try_from(target).map_err(|_| VfsError::io(format!("offset out of range: {target}")))
}

// =============================================================================
// ParentStream - a layer's handle on the layer beneath it
// =============================================================================

/// Cache entry a layer holds on its parent in a resolver context
struct Lease {
    context: Arc<ResolverContext>,
    path_spec: Arc<PathSpec>,
}

/// Positioned access to a parent stream, optionally leased from a context
pub struct ParentStream {
    io: FileIoHandle,
    lease: Option<Lease>,
}

impl ParentStream {
    /// Resolve the parent of `path_spec` through the resolver and lease it
    pub fn open_parent(
        resolver: &Resolver,
        path_spec: &PathSpec,
        context: &Arc<ResolverContext>,
    ) -> Result<Self> {
        let parent = path_spec.parent().ok_or_else(|| {
            VfsError::PathSpec(format!("{}: missing parent", path_spec.type_indicator()))
        })?;
        let io = resolver.open_file_object(parent, context)?;
        Ok(Self {
            io,
            lease: Some(Lease {
                context: Arc::clone(context),
                path_spec: Arc::clone(parent),
            }),
        })
    }

    /// Use a stream that is not owned by any context
    pub fn detached(io: FileIoHandle) -> Self {
        Self { io, lease: None }
    }

    pub fn handle(&self) -> &FileIoHandle {
        &self.io
    }

    /// Read up to `size` bytes at an absolute parent offset
    pub fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let position = i64::try_from(offset)
            .map_err(|_| VfsError::io(format!("offset out of range: {offset}")))?;
        let mut io = lock(&self.io)?;
        io.seek(position, Whence::Set)?;
        io.read(size)
    }

    pub fn size(&self) -> Result<u64> {
        lock(&self.io)?.size()
    }

    pub fn stream_metadata(&self) -> Result<StreamMetadata> {
        Ok(lock(&self.io)?.stream_metadata())
    }

    /// Give the parent back to its context
    ///
    /// An entry already evicted (context emptied first) is not an error.
    pub fn release(mut self) -> Result<()> {
        match self.lease.take() {
            Some(lease) => lease.give_back(),
            None => Ok(()),
        }
    }
}

impl Drop for ParentStream {
    // A layer whose construction failed never reaches close
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            let _ = lease.give_back();
        }
    }
}

impl Lease {
    fn give_back(self) -> Result<()> {
        match self.context.release_file_object(&self.path_spec) {
            Ok(()) => Ok(()),
            Err(VfsError::NotCached(key)) => {
                trace!(key = %key.trim_end(), "Parent already evicted from context");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to release parent stream");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use tempfile::NamedTempFile;

    use super::*;

    /// Temp file holding `data`; keep the returned guard alive
    pub fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    /// Detached parent reading from a temp file
    pub fn parent_over(file: &NamedTempFile) -> ParentStream {
        let io = OsFile::open(file.path()).unwrap();
        ParentStream::detached(into_handle(io))
    }
}
