//! Resolver context - reference-counted cache of open layers
//!
//! One context holds at most one open file object per comparable path
//! specification and one file system per file-system key. Every consumer
//! that resolves the same specification shares the same handle.
//!
//! Each entry is a slot with its own lock. The map lock is only held to find
//! or create a slot and adjust its reference count, while the slot lock is
//! held during construction. Concurrent openers of one key therefore wait
//! for the first and share its result. Opening a parent inside a slot is
//! safe because parents live in different slots. Resources are always closed
//! after the map lock is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::error::{Result, VfsError};
use crate::file_io::{lock, FileIoHandle};
use crate::path_spec::PathSpec;
use crate::vfs::FileSystemHandle;

/// Something the context can close on eviction
pub(crate) trait CachedResource: Clone {
    fn close_resource(&self) -> Result<()>;
}

impl CachedResource for FileIoHandle {
    fn close_resource(&self) -> Result<()> {
        let mut io = lock(self)?;
        if io.is_open() {
            io.close()?;
        }
        Ok(())
    }
}

impl CachedResource for FileSystemHandle {
    fn close_resource(&self) -> Result<()> {
        self.close()
    }
}

type Slot<T> = Arc<Mutex<Option<T>>>;

struct CacheEntry<T> {
    slot: Slot<T>,
    references: usize,
}

/// Key -> (resource, reference count)
struct ResourceCache<T> {
    kind: &'static str,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: CachedResource> ResourceCache<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry<T>>>> {
        self.entries
            .lock()
            .map_err(|_| VfsError::io(format!("{} cache lock poisoned", self.kind)))
    }

    fn lock_slot(slot: &Slot<T>) -> Result<std::sync::MutexGuard<'_, Option<T>>> {
        slot.lock().map_err(|_| VfsError::io("cache slot lock poisoned"))
    }

    /// Return the cached resource, or construct it with `open`; takes a reference
    fn get_or_open(&self, key: &str, open: impl FnOnce() -> Result<T>) -> Result<T> {
        let slot = {
            let mut entries = self.entries()?;
            let entry = entries.entry(key.to_string()).or_insert_with(|| CacheEntry {
                slot: Arc::new(Mutex::new(None)),
                references: 0,
            });
            entry.references += 1;
            Arc::clone(&entry.slot)
        };

        let outcome = {
            let mut value = Self::lock_slot(&slot)?;
            let cached = value.clone();
            match cached {
                Some(resource) => {
                    trace!(kind = self.kind, "Context cache hit");
                    Ok(resource)
                }
                None => open().map(|resource| {
                    *value = Some(resource.clone());
                    resource
                }),
            }
        };

        if outcome.is_err() {
            self.forget_failed(key, &slot);
        }
        outcome
    }

    /// Undo the reference taken by a failed open
    ///
    /// If that was the last reference the entry goes, and anything another
    /// opener stored in the slot meanwhile is closed outside the map lock.
    fn forget_failed(&self, key: &str, slot: &Slot<T>) {
        let evicted = {
            let Ok(mut entries) = self.entries() else {
                return;
            };
            let last_reference = match entries.get_mut(key) {
                Some(entry) if Arc::ptr_eq(&entry.slot, slot) => {
                    entry.references = entry.references.saturating_sub(1);
                    entry.references == 0
                }
                _ => false,
            };
            if last_reference {
                entries.remove(key)
            } else {
                None
            }
        };
        if let Some(entry) = evicted {
            let resource = Self::lock_slot(&entry.slot).ok().and_then(|mut v| v.take());
            if let Some(resource) = resource {
                if let Err(e) = resource.close_resource() {
                    warn!(kind = self.kind, error = %e, "Failed to close resource after failed open");
                }
            }
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        let slot = self.entries().ok()?.get(key).map(|e| Arc::clone(&e.slot))?;
        let value = Self::lock_slot(&slot).ok()?;
        value.clone()
    }

    fn insert(&self, key: &str, resource: T) -> Result<()> {
        let mut entries = self.entries()?;
        if entries.contains_key(key) {
            return Err(VfsError::io(format!(
                "{} already cached: {}",
                self.kind,
                key.trim_end()
            )));
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                slot: Arc::new(Mutex::new(Some(resource))),
                references: 1,
            },
        );
        Ok(())
    }

    fn grab(&self, key: &str) -> Result<T> {
        let slot = {
            let mut entries = self.entries()?;
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| VfsError::NotCached(key.to_string()))?;
            entry.references += 1;
            Arc::clone(&entry.slot)
        };
        let value = Self::lock_slot(&slot)?.clone();
        match value {
            Some(resource) => Ok(resource),
            None => {
                self.forget_failed(key, &slot);
                Err(VfsError::NotCached(key.to_string()))
            }
        }
    }

    /// Drop one reference; closes the resource when the count reaches zero
    fn release(&self, key: &str) -> Result<()> {
        let evicted = {
            let mut entries = self.entries()?;
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| VfsError::NotCached(key.to_string()))?;
            entry.references = entry.references.saturating_sub(1);
            if entry.references > 0 {
                return Ok(());
            }
            entries.remove(key).map(|entry| entry.slot)
        };

        if let Some(slot) = evicted {
            let resource = Self::lock_slot(&slot)?.take();
            if let Some(resource) = resource {
                debug!(kind = self.kind, "Closing evicted resource");
                resource.close_resource()?;
            }
        }
        Ok(())
    }

    fn references(&self, key: &str) -> Option<usize> {
        self.entries().ok()?.get(key).map(|e| e.references)
    }

    fn len(&self) -> usize {
        self.entries().map(|e| e.len()).unwrap_or(0)
    }

    /// Close and remove everything, regardless of reference counts
    fn empty(&self) {
        let drained: Vec<(String, Slot<T>)> = match self.entries() {
            Ok(mut entries) => entries.drain().map(|(k, e)| (k, e.slot)).collect(),
            Err(_) => return,
        };
        for (key, slot) in drained {
            let resource = Self::lock_slot(&slot).ok().and_then(|mut v| v.take());
            if let Some(resource) = resource {
                if let Err(e) = resource.close_resource() {
                    warn!(kind = self.kind, key = %key.trim_end(), error = %e, "Failed to close cached resource");
                }
            }
        }
    }
}

// =============================================================================
// ResolverContext
// =============================================================================

/// Session-scoped cache shared by every layer resolved through it
pub struct ResolverContext {
    file_objects: ResourceCache<FileIoHandle>,
    file_systems: ResourceCache<FileSystemHandle>,
}

impl Default for ResolverContext {
    fn default() -> Self {
        Self {
            file_objects: ResourceCache::new("file object"),
            file_systems: ResourceCache::new("file system"),
        }
    }
}

impl ResolverContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // -------------------------------------------------------------------------
    // File objects, keyed by comparable
    // -------------------------------------------------------------------------

    pub(crate) fn open_file_object_with(
        &self,
        path_spec: &PathSpec,
        open: impl FnOnce() -> Result<FileIoHandle>,
    ) -> Result<FileIoHandle> {
        self.file_objects.get_or_open(path_spec.comparable(), open)
    }

    /// Cached file object, without taking a reference
    pub fn get_file_object(&self, path_spec: &PathSpec) -> Option<FileIoHandle> {
        self.file_objects.get(path_spec.comparable())
    }

    /// Insert an already open file object with one reference
    pub fn cache_file_object(&self, path_spec: &PathSpec, file_object: FileIoHandle) -> Result<()> {
        self.file_objects.insert(path_spec.comparable(), file_object)
    }

    /// Take another reference on a cached file object
    pub fn grab_file_object(&self, path_spec: &PathSpec) -> Result<FileIoHandle> {
        self.file_objects.grab(path_spec.comparable())
    }

    pub fn release_file_object(&self, path_spec: &PathSpec) -> Result<()> {
        self.file_objects.release(path_spec.comparable())
    }

    pub fn file_object_references(&self, path_spec: &PathSpec) -> Option<usize> {
        self.file_objects.references(path_spec.comparable())
    }

    // -------------------------------------------------------------------------
    // File systems, keyed by file-system key
    // -------------------------------------------------------------------------

    pub(crate) fn open_file_system_with(
        &self,
        path_spec: &PathSpec,
        open: impl FnOnce() -> Result<FileSystemHandle>,
    ) -> Result<FileSystemHandle> {
        self.file_systems.get_or_open(&path_spec.file_system_key(), open)
    }

    pub fn get_file_system(&self, path_spec: &PathSpec) -> Option<FileSystemHandle> {
        self.file_systems.get(&path_spec.file_system_key())
    }

    pub fn cache_file_system(&self, path_spec: &PathSpec, file_system: FileSystemHandle) -> Result<()> {
        self.file_systems.insert(&path_spec.file_system_key(), file_system)
    }

    pub fn grab_file_system(&self, path_spec: &PathSpec) -> Result<FileSystemHandle> {
        self.file_systems.grab(&path_spec.file_system_key())
    }

    pub fn release_file_system(&self, path_spec: &PathSpec) -> Result<()> {
        self.file_systems.release(&path_spec.file_system_key())
    }

    pub fn file_system_references(&self, path_spec: &PathSpec) -> Option<usize> {
        self.file_systems.references(&path_spec.file_system_key())
    }

    /// Number of cached (file objects, file systems)
    pub fn cached_counts(&self) -> (usize, usize) {
        (self.file_objects.len(), self.file_systems.len())
    }

    /// Close and forget everything; file systems go first since they lease file objects
    pub fn empty(&self) {
        self.file_systems.empty();
        self.file_objects.empty();
        debug!("Resolver context emptied");
    }
}
