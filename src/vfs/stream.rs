//! Single-stream file system for layers whose content is one byte stream
//!
//! GZIP, COMPRESSED_STREAM, ENCODED_STREAM and DATA_RANGE have no directory
//! structure of their own. The file system exposes one root entry, flagged
//! root and virtual, that opens the layer's stream.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::{FileEntry, FileEntryKind, FileSystem};
use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use crate::file_io::{lock, StreamMetadata};
use crate::path_spec::PathSpec;
use crate::resolver::{Resolver, ResolverContext};

/// Leased file object backing the root entry
struct StreamLease {
    context: Arc<ResolverContext>,
}

pub struct StreamFileSystem {
    path_spec: Arc<PathSpec>,
    root: FileEntry,
    lease: Mutex<Option<StreamLease>>,
}

impl StreamFileSystem {
    /// Open the layer's stream through the resolver and describe it
    pub fn open(resolver: &Resolver, path_spec: &Arc<PathSpec>, context: &Arc<ResolverContext>) -> Result<Self> {
        let handle = resolver.open_file_object(path_spec, context)?;
        let described = lock(&handle).and_then(|mut io| io.size().map(|size| (size, io.stream_metadata())));
        let (size, metadata) = match described {
            Ok(described) => described,
            Err(e) => {
                if let Err(release_err) = context.release_file_object(path_spec) {
                    warn!(error = %release_err, "Failed to release stream after failed open");
                }
                return Err(e);
            }
        };

        let StreamMetadata {
            name,
            modification_time,
            ..
        } = metadata;
        let root = FileEntry {
            path_spec: Arc::clone(path_spec),
            name: name.unwrap_or_default(),
            kind: FileEntryKind::File,
            size: Some(size),
            modification_time,
            is_root: true,
            is_virtual: true,
        };
        debug!(type_indicator = %path_spec.type_indicator(), size, "Opened stream file system");
        Ok(Self {
            path_spec: Arc::clone(path_spec),
            root,
            lease: Mutex::new(Some(StreamLease {
                context: Arc::clone(context),
            })),
        })
    }
}

impl FileSystem for StreamFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        self.path_spec.type_indicator()
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn root_file_entry(&self) -> Result<FileEntry> {
        Ok(self.root.clone())
    }

    fn file_entry_by_path_spec(&self, path_spec: &Arc<PathSpec>) -> Result<Option<FileEntry>> {
        Ok((**path_spec == *self.path_spec).then(|| self.root.clone()))
    }

    fn sub_file_entries(&self, _entry: &FileEntry) -> Result<Vec<FileEntry>> {
        Ok(Vec::new())
    }

    fn close(&self) -> Result<()> {
        let lease = self
            .lease
            .lock()
            .map_err(|_| VfsError::io("stream file system lock poisoned"))?
            .take();
        match lease {
            Some(lease) => match lease.context.release_file_object(&self.path_spec) {
                Ok(()) | Err(VfsError::NotCached(_)) => Ok(()),
                Err(e) => Err(e),
            },
            None => Err(VfsError::not_open("stream file system")),
        }
    }
}
