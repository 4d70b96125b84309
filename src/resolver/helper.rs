//! Resolver helper - per-kind factory for file objects and file systems

use std::sync::Arc;

use super::{Resolver, ResolverContext};
use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use crate::file_io::FileIoHandle;
use crate::path_spec::PathSpec;
use crate::vfs::FileSystemHandle;

/// Opens layers of one type indicator
///
/// Helpers are called with the context slot for `path_spec` held, so they
/// must not open `path_spec` itself again. Opening the parent through the
/// resolver is expected.
pub trait ResolverHelper: Send + Sync {
    fn type_indicator(&self) -> TypeIndicator;

    fn new_file_object(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle>;

    fn new_file_system(
        &self,
        _resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        _context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        Err(VfsError::UnsupportedType(format!(
            "{}: no file system support",
            path_spec.type_indicator()
        )))
    }
}
