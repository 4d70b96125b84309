//! File system view - structured entries on top of resolved layers
//!
//! A [`FileSystem`] enumerates [`FileEntry`] values. Each entry carries the
//! path specification that opens its content through the resolver. Layers
//! that are a single stream (gzip, compressed or encoded streams, data
//! ranges) expose a file system with one synthesized root entry.
//!
//! ## Module Structure
//! ```text
//! vfs/
//! ├── mod.rs     - FileSystem trait, FileEntry
//! ├── os.rs      - OsFileSystem (std::fs)
//! └── stream.rs  - StreamFileSystem (single virtual root)
//! ```

mod os;
mod stream;

pub use os::OsFileSystem;
pub use stream::StreamFileSystem;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::definitions::TypeIndicator;
use crate::error::Result;
use crate::file_io::FileIoHandle;
use crate::path_spec::PathSpec;
use crate::resolver::{Resolver, ResolverContext};

/// Kind of object a file entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEntryKind {
    File,
    Directory,
    Link,
    Other,
}

/// One entry of a file system
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path_spec: Arc<PathSpec>,
    pub name: String,
    pub kind: FileEntryKind,
    pub size: Option<u64>,
    pub modification_time: Option<DateTime<Utc>>,
    /// Root of its file system
    pub is_root: bool,
    /// Synthesized rather than backed by an on-disk record
    pub is_virtual: bool,
}

impl FileEntry {
    pub fn is_file(&self) -> bool {
        self.kind == FileEntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileEntryKind::Directory
    }

    /// Open the entry's content through the resolver
    pub fn open(&self, resolver: &Resolver, context: &Arc<ResolverContext>) -> Result<FileIoHandle> {
        resolver.open_file_object(&self.path_spec, context)
    }
}

/// Structured view over a layer
pub trait FileSystem: Send + Sync {
    fn type_indicator(&self) -> TypeIndicator;

    /// Specification the file system was opened with
    fn path_spec(&self) -> &Arc<PathSpec>;

    fn root_file_entry(&self) -> Result<FileEntry>;

    /// Entry for a specification in this file system, None if it does not exist
    fn file_entry_by_path_spec(&self, path_spec: &Arc<PathSpec>) -> Result<Option<FileEntry>>;

    fn file_entry_exists(&self, path_spec: &Arc<PathSpec>) -> Result<bool> {
        Ok(self.file_entry_by_path_spec(path_spec)?.is_some())
    }

    /// Children of a directory entry, sorted by name
    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>>;

    /// Release what the file system holds; called by the context on eviction
    fn close(&self) -> Result<()>;
}

/// Shared handle to an open file system
pub type FileSystemHandle = Arc<dyn FileSystem>;
