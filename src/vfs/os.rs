//! OS file system - entries backed by std::fs metadata

use std::fs::{self, Metadata};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{FileEntry, FileEntryKind, FileSystem};
use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use crate::path_spec::{Layer, PathSpec};

/// Location of the root entry
pub const OS_ROOT_LOCATION: &str = "/";

pub struct OsFileSystem {
    path_spec: Arc<PathSpec>,
}

impl OsFileSystem {
    pub fn new(path_spec: Arc<PathSpec>) -> Self {
        Self { path_spec }
    }

    fn entry_for(&self, path_spec: Arc<PathSpec>, metadata: &Metadata) -> FileEntry {
        let location = path_spec.location().unwrap_or_default().to_string();
        let is_root = location == OS_ROOT_LOCATION;
        let name = Path::new(&location)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileEntryKind::Link
        } else if file_type.is_dir() {
            FileEntryKind::Directory
        } else if file_type.is_file() {
            FileEntryKind::File
        } else {
            FileEntryKind::Other
        };
        FileEntry {
            path_spec,
            name,
            kind,
            size: (kind == FileEntryKind::File).then(|| metadata.len()),
            modification_time: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_root,
            is_virtual: false,
        }
    }
}

fn os_location(path_spec: &PathSpec) -> Result<&str> {
    match path_spec.layer() {
        Layer::Os { location } => Ok(location),
        other => Err(VfsError::PathSpec(format!(
            "OS file system cannot resolve {} specification",
            other.type_indicator()
        ))),
    }
}

impl FileSystem for OsFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn root_file_entry(&self) -> Result<FileEntry> {
        let root = PathSpec::os(OS_ROOT_LOCATION)?;
        self.file_entry_by_path_spec(&root)?
            .ok_or_else(|| VfsError::io("OS root directory not accessible"))
    }

    fn file_entry_by_path_spec(&self, path_spec: &Arc<PathSpec>) -> Result<Option<FileEntry>> {
        let location = os_location(path_spec)?;
        match fs::metadata(location) {
            Ok(metadata) => Ok(Some(self.entry_for(Arc::clone(path_spec), &metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VfsError::from_io(format!("unable to stat {location}"), e)),
        }
    }

    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        if !entry.is_directory() {
            return Ok(Vec::new());
        }
        let location = os_location(&entry.path_spec)?;
        let reader = fs::read_dir(location)
            .map_err(|e| VfsError::from_io(format!("unable to list {location}"), e))?;

        let mut entries = Vec::new();
        for dir_entry in reader {
            let dir_entry = dir_entry.map_err(|e| VfsError::from_io(format!("unable to list {location}"), e))?;
            let path = dir_entry.path();
            let metadata = match fs::metadata(&path).or_else(|_| fs::symlink_metadata(&path)) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let child = PathSpec::os(path.to_string_lossy())?;
            entries.push(self.entry_for(child, &metadata));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(location, count = entries.len(), "Listed OS directory");
        Ok(entries)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entries_and_listing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.bin"), b"12345").unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();

        let dir_spec = PathSpec::os(dir.path().to_string_lossy()).unwrap();
        let fs_view = OsFileSystem::new(Arc::clone(&dir_spec));
        let entry = fs_view.file_entry_by_path_spec(&dir_spec).unwrap().unwrap();
        assert!(entry.is_directory());
        assert!(!entry.is_root && !entry.is_virtual);

        let children = fs_view.sub_file_entries(&entry).unwrap();
        let names: Vec<&str> = children.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.bin", "c"]);
        assert_eq!(children[1].size, Some(5));
        assert!(children[2].is_directory());
        assert!(children[2].size.is_none());
        assert!(fs_view.sub_file_entries(&children[0]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_entry_and_root() {
        let dir = TempDir::new().unwrap();
        let missing = PathSpec::os(dir.path().join("gone").to_string_lossy()).unwrap();
        let fs_view = OsFileSystem::new(Arc::clone(&missing));
        assert!(fs_view.file_entry_by_path_spec(&missing).unwrap().is_none());
        assert!(!fs_view.file_entry_exists(&missing).unwrap());

        let root = fs_view.root_file_entry().unwrap();
        assert!(root.is_root);
        assert!(root.is_directory());
    }
}
