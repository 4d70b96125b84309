//! Resolver - turns path specifications into open layers
//!
//! The resolver maps each type indicator to a [`ResolverHelper`] and
//! resolves a specification from its root upward: a helper opens the parent
//! through the resolver first, then wraps it. Every result goes through the
//! caller's [`ResolverContext`], so a layer shared by several chains is
//! opened once.
//!
//! ```text
//! open_file_object(GZIP ─► DATA_RANGE ─► OS)
//!   context slot "…GZIP"        miss ─► GzipResolverHelper
//!     context slot "…DATA_RANGE" miss ─► DataRangeResolverHelper
//!       context slot "OS"         miss ─► OsResolverHelper ─► OsFile
//! ```
//!
//! ## Module Structure
//! ```text
//! resolver/
//! ├── mod.rs      - Resolver (helper registry, codec registries, key chain)
//! ├── helper.rs   - ResolverHelper trait
//! ├── helpers.rs  - built-in helpers
//! └── context.rs  - ResolverContext (reference-counted cache)
//! ```

mod context;
mod helper;
pub mod helpers;

pub use context::ResolverContext;
pub use helper::ResolverHelper;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::compression::DecompressorRegistry;
use crate::config::VfsConfig;
use crate::definitions::TypeIndicator;
use crate::encoding::DecoderRegistry;
use crate::error::{Result, VfsError};
use crate::file_io::FileIoHandle;
use crate::key_chain::KeyChain;
use crate::path_spec::PathSpec;
use crate::vfs::{FileEntry, FileSystemHandle};

const HELPER_REGISTRY: &str = "resolver helper";

/// Entry point for opening layers
///
/// Helpers can be registered while the resolver is shared. The codec
/// registries are configured before sharing, through the `_mut` accessors.
pub struct Resolver {
    helpers: RwLock<HashMap<TypeIndicator, Arc<dyn ResolverHelper>>>,
    decompressors: DecompressorRegistry,
    decoders: DecoderRegistry,
    key_chain: KeyChain,
    config: VfsConfig,
}

impl Resolver {
    /// Resolver with no helpers and empty codec registries
    pub fn new(config: VfsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            helpers: RwLock::new(HashMap::new()),
            decompressors: DecompressorRegistry::new(),
            decoders: DecoderRegistry::new(),
            key_chain: KeyChain::new(),
            config,
        })
    }

    /// Resolver with the built-in helpers, decompressors and decoders
    pub fn with_defaults(config: VfsConfig) -> Result<Self> {
        let mut resolver = Self::new(config)?;
        resolver.decompressors = DecompressorRegistry::with_defaults();
        resolver.decoders = DecoderRegistry::with_defaults();
        for helper in helpers::default_helpers() {
            resolver.register_helper(helper)?;
        }
        info!(
            helpers = resolver.helper_count(),
            decompressors = ?resolver.decompressors.methods(),
            decoders = ?resolver.decoders.methods(),
            "Resolver initialized"
        );
        Ok(resolver)
    }

    // =========================================================================
    // Helper registry
    // =========================================================================

    pub fn register_helper(&self, helper: Arc<dyn ResolverHelper>) -> Result<()> {
        let type_indicator = helper.type_indicator();
        let mut helpers = self.write_helpers()?;
        if helpers.contains_key(&type_indicator) {
            return Err(VfsError::AlreadyRegistered {
                registry: HELPER_REGISTRY,
                name: type_indicator.to_string(),
            });
        }
        helpers.insert(type_indicator, helper);
        debug!(%type_indicator, "Registered resolver helper");
        Ok(())
    }

    pub fn deregister_helper(&self, type_indicator: TypeIndicator) -> Result<()> {
        match self.write_helpers()?.remove(&type_indicator) {
            Some(_) => Ok(()),
            None => Err(VfsError::NotRegistered {
                registry: HELPER_REGISTRY,
                name: type_indicator.to_string(),
            }),
        }
    }

    pub fn has_helper(&self, type_indicator: TypeIndicator) -> bool {
        self.helpers
            .read()
            .map(|helpers| helpers.contains_key(&type_indicator))
            .unwrap_or(false)
    }

    fn helper_count(&self) -> usize {
        self.helpers.read().map(|helpers| helpers.len()).unwrap_or(0)
    }

    fn helper(&self, type_indicator: TypeIndicator) -> Result<Arc<dyn ResolverHelper>> {
        self.helpers
            .read()
            .map_err(|_| VfsError::Config("resolver helper registry lock poisoned".to_string()))?
            .get(&type_indicator)
            .cloned()
            .ok_or_else(|| VfsError::UnsupportedType(type_indicator.to_string()))
    }

    fn write_helpers(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<TypeIndicator, Arc<dyn ResolverHelper>>>> {
        self.helpers
            .write()
            .map_err(|_| VfsError::Config("resolver helper registry lock poisoned".to_string()))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn key_chain(&self) -> &KeyChain {
        &self.key_chain
    }

    pub fn decompressors(&self) -> &DecompressorRegistry {
        &self.decompressors
    }

    pub fn decompressors_mut(&mut self) -> &mut DecompressorRegistry {
        &mut self.decompressors
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn decoders_mut(&mut self) -> &mut DecoderRegistry {
        &mut self.decoders
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Open (or share) the file object for `path_spec`
    ///
    /// Each successful call takes one reference in `context`; give it back
    /// with [`Resolver::release_file_object`].
    pub fn open_file_object(&self, path_spec: &Arc<PathSpec>, context: &Arc<ResolverContext>) -> Result<FileIoHandle> {
        self.key_chain.extract_credentials_from_path_spec(path_spec)?;
        let helper = self.helper(path_spec.type_indicator())?;
        context.open_file_object_with(path_spec, || {
            debug!(type_indicator = %path_spec.type_indicator(), depth = path_spec.depth(), "Opening file object");
            helper.new_file_object(self, path_spec, context)
        })
    }

    /// Open (or share) the file system `path_spec` lives in
    pub fn open_file_system(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<FileSystemHandle> {
        self.key_chain.extract_credentials_from_path_spec(path_spec)?;
        let helper = self.helper(path_spec.type_indicator())?;
        context.open_file_system_with(path_spec, || {
            debug!(type_indicator = %path_spec.type_indicator(), "Opening file system");
            helper.new_file_system(self, path_spec, context)
        })
    }

    /// Look up the entry for `path_spec`, None if it does not exist
    ///
    /// The file system reference taken for the lookup is released before
    /// returning. The entry stays usable since opening it goes back through
    /// the resolver.
    pub fn open_file_entry(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &Arc<ResolverContext>,
    ) -> Result<Option<FileEntry>> {
        let file_system = self.open_file_system(path_spec, context)?;
        let entry = file_system.file_entry_by_path_spec(path_spec);
        context.release_file_system(path_spec)?;
        entry
    }

    pub fn release_file_object(&self, path_spec: &PathSpec, context: &ResolverContext) -> Result<()> {
        context.release_file_object(path_spec)
    }

    pub fn release_file_system(&self, path_spec: &PathSpec, context: &ResolverContext) -> Result<()> {
        context.release_file_system(path_spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::test_data as compressed;
    use crate::error::ErrorKind;
    use crate::file_io::lock;
    use crate::file_io::test_support::temp_file;
    use crate::file_io::{into_handle, FileIo, OsFile, Whence};
    use crate::gzip::test_data::{gzip_member, gzip_member_with_header};
    use crate::key_chain::CredentialKind;
    use crate::path_spec::Layer;
    use base64::Engine;

    fn resolver() -> Resolver {
        Resolver::with_defaults(VfsConfig::default()).unwrap()
    }

    fn read_everything(handle: &FileIoHandle) -> Vec<u8> {
        let mut io = lock(handle).unwrap();
        io.seek(0, Whence::Set).unwrap();
        io.read_all().unwrap()
    }

    /// "junk" + gzip(AAAA) + gzip(BBBBBB) + "tail", and the chain OS > DATA_RANGE > GZIP
    fn gzip_in_range() -> (tempfile::NamedTempFile, Arc<PathSpec>) {
        let mut members = gzip_member(b"AAAA");
        members.extend(gzip_member_with_header(b"BBBBBB", Some("b.txt"), None, 1_600_000_000));
        let mut data = b"junk".to_vec();
        data.extend(&members);
        data.extend(b"tail");
        let file = temp_file(&data);

        let os = PathSpec::os(file.path().to_string_lossy()).unwrap();
        let range = os
            .child(Layer::DataRange {
                range_offset: 4,
                range_size: members.len() as u64,
            })
            .unwrap();
        let gzip = range.child(Layer::Gzip).unwrap();
        (file, gzip)
    }

    #[test]
    fn test_nested_chain_reads_and_tears_down() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let (_file, spec) = gzip_in_range();

        let handle = resolver.open_file_object(&spec, &context).unwrap();
        assert_eq!(read_everything(&handle), b"AAAABBBBBB");
        assert_eq!(context.cached_counts(), (3, 0));
        let range = spec.parent().unwrap();
        assert_eq!(context.file_object_references(range), Some(1));
        assert_eq!(context.file_object_references(range.parent().unwrap()), Some(1));

        resolver.release_file_object(&spec, &context).unwrap();
        assert_eq!(context.cached_counts(), (0, 0));
        assert!(!lock(&handle).unwrap().is_open());
    }

    #[test]
    fn test_shared_layers_are_opened_once() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let (_file, spec) = gzip_in_range();
        let range = spec.parent().unwrap();

        let gzip = resolver.open_file_object(&spec, &context).unwrap();
        let direct = resolver.open_file_object(range, &context).unwrap();
        let again = resolver.open_file_object(range, &context).unwrap();
        assert!(Arc::ptr_eq(&direct, &again));
        // One reference held by the gzip layer plus two direct opens
        assert_eq!(context.file_object_references(range), Some(3));

        resolver.release_file_object(&spec, &context).unwrap();
        assert_eq!(context.file_object_references(range), Some(2));
        assert!(!lock(&gzip).unwrap().is_open());

        resolver.release_file_object(range, &context).unwrap();
        resolver.release_file_object(range, &context).unwrap();
        assert_eq!(context.cached_counts(), (0, 0));
    }

    #[test]
    fn test_encoded_then_compressed_chain() {
        let plain = compressed::sample(100_000);
        let text = base64::engine::general_purpose::STANDARD.encode(compressed::zlib(&plain));
        let file = temp_file(text.as_bytes());

        let spec = PathSpec::os(file.path().to_string_lossy())
            .unwrap()
            .child(Layer::EncodedStream {
                encoding_method: "base64".to_string(),
            })
            .unwrap()
            .child(Layer::CompressedStream {
                compression_method: "zlib".to_string(),
            })
            .unwrap();

        let resolver = resolver();
        let context = ResolverContext::new();
        let handle = resolver.open_file_object(&spec, &context).unwrap();
        {
            let mut io = lock(&handle).unwrap();
            assert_eq!(io.size().unwrap(), plain.len() as u64);
            io.seek(50_000, Whence::Set).unwrap();
            assert_eq!(io.read(10).unwrap(), &plain[50_000..50_010]);
        }
        resolver.release_file_object(&spec, &context).unwrap();
        assert_eq!(context.cached_counts(), (0, 0));
    }

    #[test]
    fn test_failed_open_releases_parents() {
        let file = temp_file(b"not gzip at all");
        let spec = PathSpec::os(file.path().to_string_lossy())
            .unwrap()
            .child(Layer::Gzip)
            .unwrap();

        let resolver = resolver();
        let context = ResolverContext::new();
        let err = resolver.open_file_object(&spec, &context).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(context.cached_counts(), (0, 0));

        let unknown = PathSpec::os(file.path().to_string_lossy())
            .unwrap()
            .child(Layer::CompressedStream {
                compression_method: "lz4".to_string(),
            })
            .unwrap();
        let err = resolver.open_file_object(&unknown, &context).err().unwrap();
        assert!(matches!(err, VfsError::NotRegistered { .. }));
        assert_eq!(context.cached_counts(), (0, 0));
    }

    #[test]
    fn test_unsupported_type_and_helper_registry() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let spec = PathSpec::os("/nonexistent").unwrap().child(Layer::Raw).unwrap();
        let err = resolver.open_file_object(&spec, &context).err().unwrap();
        assert!(matches!(err, VfsError::UnsupportedType(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = resolver
            .register_helper(Arc::new(helpers::GzipResolverHelper))
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyRegistered { .. }));

        resolver.deregister_helper(TypeIndicator::Gzip).unwrap();
        assert!(!resolver.has_helper(TypeIndicator::Gzip));
        assert!(resolver.deregister_helper(TypeIndicator::Gzip).is_err());
        resolver.register_helper(Arc::new(helpers::GzipResolverHelper)).unwrap();
        assert!(resolver.has_helper(TypeIndicator::Gzip));
    }

    #[test]
    fn test_custom_helper() {
        struct FixedRaw;

        impl ResolverHelper for FixedRaw {
            fn type_indicator(&self) -> TypeIndicator {
                TypeIndicator::Raw
            }

            fn new_file_object(
                &self,
                _resolver: &Resolver,
                path_spec: &Arc<PathSpec>,
                _context: &Arc<ResolverContext>,
            ) -> Result<FileIoHandle> {
                let location = path_spec.parent().and_then(|p| p.location()).unwrap_or_default();
                Ok(into_handle(OsFile::open(location)?))
            }
        }

        let file = temp_file(b"raw bytes");
        let spec = PathSpec::os(file.path().to_string_lossy())
            .unwrap()
            .child(Layer::Raw)
            .unwrap();
        let resolver = resolver();
        resolver.register_helper(Arc::new(FixedRaw)).unwrap();
        let context = ResolverContext::new();
        let handle = resolver.open_file_object(&spec, &context).unwrap();
        assert_eq!(read_everything(&handle), b"raw bytes");
        assert_eq!(context.cached_counts(), (1, 0));
    }

    #[test]
    fn test_file_systems_and_entries() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let (file, spec) = gzip_in_range();

        let file_system = resolver.open_file_system(&spec, &context).unwrap();
        assert_eq!(file_system.type_indicator(), TypeIndicator::Gzip);
        let root = file_system.root_file_entry().unwrap();
        assert!(root.is_root && root.is_virtual);
        assert_eq!(root.name, "b.txt");
        assert_eq!(root.size, Some(10));
        assert_eq!(root.modification_time.unwrap().timestamp(), 1_600_000_000);
        assert!(file_system.sub_file_entries(&root).unwrap().is_empty());

        let handle = root.open(&resolver, &context).unwrap();
        assert_eq!(read_everything(&handle), b"AAAABBBBBB");
        assert_eq!(context.file_object_references(&spec), Some(2));
        resolver.release_file_object(&spec, &context).unwrap();

        resolver.release_file_system(&spec, &context).unwrap();
        assert_eq!(context.cached_counts(), (0, 0));

        let os = PathSpec::os(file.path().to_string_lossy()).unwrap();
        let entry = resolver.open_file_entry(&os, &context).unwrap().unwrap();
        assert!(entry.is_file());
        assert!(!entry.is_virtual);
        let missing = PathSpec::os(format!("{}.missing", file.path().display())).unwrap();
        assert!(resolver.open_file_entry(&missing, &context).unwrap().is_none());
        assert_eq!(context.cached_counts(), (0, 0));
    }

    #[test]
    fn test_context_empty_closes_everything() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let (_file, spec) = gzip_in_range();

        let handle = resolver.open_file_object(&spec, &context).unwrap();
        resolver.open_file_system(&spec, &context).unwrap();
        context.empty();
        assert_eq!(context.cached_counts(), (0, 0));
        assert!(!lock(&handle).unwrap().is_open());
        assert!(resolver.release_file_object(&spec, &context).is_err());
    }

    #[test]
    fn test_inline_credentials_reach_the_key_chain() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let spec = PathSpec::os("/nonexistent")
            .unwrap()
            .child(Layer::Bde {
                password: Some("secret".to_string()),
                recovery_password: None,
                startup_key: None,
            })
            .unwrap();
        assert!(resolver.open_file_object(&spec, &context).is_err());
        assert_eq!(
            resolver.key_chain().get_credential(&spec, CredentialKind::Password).as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn test_concurrent_resolution_shares_one_context() {
        let resolver = resolver();
        let context = ResolverContext::new();
        let (_file, spec) = gzip_in_range();

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        for _ in 0..10 {
                            let handle = resolver.open_file_object(&spec, &context).unwrap();
                            assert_eq!(read_everything(&handle), b"AAAABBBBBB");
                            resolver.release_file_object(&spec, &context).unwrap();
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
        });
        assert_eq!(context.cached_counts(), (0, 0));
    }
}
