//! Built-in resolver helpers
//!
//! | Type indicator      | File object        | File system        |
//! |---------------------|--------------------|--------------------|
//! | OS                  | `OsFile`           | `OsFileSystem`     |
//! | DATA_RANGE          | `DataRange`        | `StreamFileSystem` |
//! | COMPRESSED_STREAM   | `CompressedStream` | `StreamFileSystem` |
//! | ENCODED_STREAM      | `EncodedStream`    | `StreamFileSystem` |
//! | GZIP                | `GzipFile`         | `StreamFileSystem` |

use std::sync::Arc;

use super::{Resolver, ResolverContext, ResolverHelper};
use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use crate::file_io::{into_handle, CompressedStream, DataRange, EncodedStream, FileIoHandle, OsFile, ParentStream};
use crate::gzip::GzipFile;
use crate::path_spec::{Layer, PathSpec};
use crate::vfs::{FileSystemHandle, OsFileSystem, StreamFileSystem};

/// Every helper registered by `Resolver::with_defaults`
pub fn default_helpers() -> Vec<Arc<dyn ResolverHelper>> {
    vec![
        Arc::new(OsResolverHelper),
        Arc::new(DataRangeResolverHelper),
        Arc::new(CompressedStreamResolverHelper),
        Arc::new(EncodedStreamResolverHelper),
        Arc::new(GzipResolverHelper),
    ]
}

fn unexpected_layer(expected: TypeIndicator, path_spec: &PathSpec) -> VfsError {
    VfsError::PathSpec(format!(
        "{expected} helper given {} specification",
        path_spec.type_indicator()
    ))
}

fn stream_file_system(
    resolver: &Resolver,
    path_spec: &Arc<PathSpec>,
    context: &Arc<ResolverContext>,
) -> Result<FileSystemHandle> {
    Ok(Arc::new(StreamFileSystem::open(resolver, path_spec, context)?))
}

pub struct OsResolverHelper;

impl ResolverHelper for OsResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn new_file_object(
        &self,
        _resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        _context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle> {
        let Layer::Os { location } = path_spec.layer() else {
            return Err(unexpected_layer(TypeIndicator::Os, path_spec));
        };
        Ok(into_handle(OsFile::open(location)?))
    }

    fn new_file_system(
        &self,
        _resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        _context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        Ok(Arc::new(OsFileSystem::new(Arc::clone(path_spec))))
    }
}

pub struct DataRangeResolverHelper;

impl ResolverHelper for DataRangeResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::DataRange
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle> {
        let Layer::DataRange {
            range_offset,
            range_size,
        } = *path_spec.layer()
        else {
            return Err(unexpected_layer(TypeIndicator::DataRange, path_spec));
        };
        let parent = ParentStream::open_parent(resolver, path_spec, context)?;
        Ok(into_handle(DataRange::new(parent, range_offset, range_size)?))
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        stream_file_system(resolver, path_spec, context)
    }
}

pub struct CompressedStreamResolverHelper;

impl ResolverHelper for CompressedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::CompressedStream
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle> {
        let Layer::CompressedStream { compression_method } = path_spec.layer() else {
            return Err(unexpected_layer(TypeIndicator::CompressedStream, path_spec));
        };
        let parent = ParentStream::open_parent(resolver, path_spec, context)?;
        let stream = CompressedStream::new(parent, compression_method, resolver.decompressors(), resolver.config())?;
        Ok(into_handle(stream))
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        stream_file_system(resolver, path_spec, context)
    }
}

pub struct EncodedStreamResolverHelper;

impl ResolverHelper for EncodedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::EncodedStream
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle> {
        let Layer::EncodedStream { encoding_method } = path_spec.layer() else {
            return Err(unexpected_layer(TypeIndicator::EncodedStream, path_spec));
        };
        let parent = ParentStream::open_parent(resolver, path_spec, context)?;
        let stream = EncodedStream::new(parent, encoding_method, resolver.decoders(), resolver.config())?;
        Ok(into_handle(stream))
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        stream_file_system(resolver, path_spec, context)
    }
}

pub struct GzipResolverHelper;

impl ResolverHelper for GzipResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Gzip
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileIoHandle> {
        let parent = ParentStream::open_parent(resolver, path_spec, context)?;
        Ok(into_handle(GzipFile::open(parent, resolver.config())?))
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        stream_file_system(resolver, path_spec, context)
    }
}
