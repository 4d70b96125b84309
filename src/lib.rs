//! FFX-VFS - layered virtual file system for forensic images
//!
//! Evidence is rarely a plain file: a disk image sits inside a gzip file,
//! which sits inside a byte range of another image, and so on. Each of
//! those wrappings is a *layer*. A [`PathSpec`] names a chain of layers
//! from an OS file upward, and the [`Resolver`] opens that chain bottom-up
//! into one seekable [`FileIo`] stream.
//!
//! ```text
//!  PathSpec chain                       opened layers
//!  ──────────────                       ─────────────
//!  COMPRESSED_STREAM (bzip2)  ───►  CompressedStream  (seek by replay)
//!        │ parent                          │ ParentStream lease
//!  DATA_RANGE (4096, +1 MiB)  ───►  DataRange
//!        │ parent                          │ ParentStream lease
//!  OS (/evidence/disk.raw)    ───►  OsFile
//! ```
//!
//! Layers opened through a [`ResolverContext`] are cached by the comparable
//! form of their specification and reference counted, so chains that share
//! a prefix share its open layers. Releasing the top layer releases the
//! chain beneath it.
//!
//! ## Module Structure
//! ```text
//! src/
//! ├── lib.rs          - crate root, re-exports
//! ├── error.rs        - VfsError, ErrorKind
//! ├── config.rs       - VfsConfig (JSON loadable)
//! ├── logging.rs      - tracing subscriber set-up
//! ├── definitions.rs  - TypeIndicator, method identifiers
//! ├── path_spec/      - PathSpec, Layer, factory and JSON form
//! ├── key_chain.rs    - credentials for encrypted layers
//! ├── resolver/       - Resolver, helpers, ResolverContext
//! ├── file_io/        - FileIo trait and stream layers
//! ├── compression/    - decompressor registry and codecs
//! ├── encoding/       - decoder registry and base16/32/64
//! ├── gzip/           - multi-member gzip container
//! ├── vfs/            - FileSystem and FileEntry view
//! ├── analyzer.rs     - signature detection
//! └── common/         - binary reading helpers
//! ```
//!
//! ## Example
//! ```no_run
//! use ffx_vfs::{lock, Layer, PathSpec, Resolver, ResolverContext, VfsConfig, Whence};
//!
//! # fn main() -> ffx_vfs::Result<()> {
//! let resolver = Resolver::with_defaults(VfsConfig::default())?;
//! let context = ResolverContext::new();
//! let spec = PathSpec::os("/evidence/image.raw.gz")?.child(Layer::Gzip)?;
//!
//! let handle = resolver.open_file_object(&spec, &context)?;
//! {
//!     let mut io = lock(&handle)?;
//!     io.seek(512, Whence::Set)?;
//!     let sector = io.read(512)?;
//!     println!("{} bytes", sector.len());
//! }
//! resolver.release_file_object(&spec, &context)?;
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod common;
pub mod compression;
pub mod config;
pub mod definitions;
pub mod encoding;
pub mod error;
pub mod file_io;
pub mod gzip;
pub mod key_chain;
pub mod logging;
pub mod path_spec;
pub mod resolver;
pub mod vfs;

pub use analyzer::{Analyzer, SignatureCategory, SignatureMatch};
pub use config::VfsConfig;
pub use definitions::TypeIndicator;
pub use error::{ErrorKind, Result, VfsError};
pub use file_io::{into_handle, lock, FileIo, FileIoHandle, FileIoReader, StreamMetadata, Whence};
pub use gzip::GzipFile;
pub use key_chain::{CredentialKind, KeyChain};
pub use path_spec::{Layer, PathSpec};
pub use resolver::{Resolver, ResolverContext, ResolverHelper};
pub use vfs::{FileEntry, FileEntryKind, FileSystem, FileSystemHandle};
