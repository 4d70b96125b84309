//! Path specifications - recursive addresses through stacked storage layers
//!
//! A path specification is a chain of nodes. Each node names one layer (its
//! kind plus the coordinates inside that layer) and points at the layer
//! underneath it, down to an OS-visible file:
//!
//! ```text
//! GZIP
//!  └── DATA_RANGE  range_offset: 1048576, range_size: 4096
//!       └── OS     location: /cases/disk.raw
//! ```
//!
//! The chain's `comparable` string is its identity: equality, hashing and
//! every resolver cache key derive from it.
//!
//! ## Module Structure
//! ```text
//! path_spec/
//! ├── mod.rs         - Layer, PathSpec, comparable forms
//! ├── attributes.rs  - AttributeValue and per-layer attribute plumbing
//! └── factory.rs     - construction from name/value maps, serde support
//! ```

mod attributes;
mod factory;

pub use attributes::AttributeValue;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};
use attributes::AttributeList;

// =============================================================================
// Layer - one node's kind and coordinates
// =============================================================================

/// Kind-specific coordinates of one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Os { location: String },
    Raw,
    DataRange { range_offset: u64, range_size: u64 },
    CompressedStream { compression_method: String },
    EncodedStream { encoding_method: String },
    Gzip,
    Gpt { location: Option<String>, entry_index: Option<u64> },
    Apm { location: Option<String>, entry_index: Option<u64> },
    TskPartition {
        location: Option<String>,
        part_index: Option<u64>,
        start_offset: Option<u64>,
    },
    Tsk {
        location: Option<String>,
        inode: Option<u64>,
        data_stream: Option<String>,
    },
    Ntfs {
        location: Option<String>,
        mft_entry: Option<u64>,
        mft_attribute: Option<u64>,
        data_stream: Option<String>,
    },
    Ext { location: Option<String>, inode: Option<u64> },
    Xfs { location: Option<String>, inode: Option<u64> },
    Hfs {
        location: Option<String>,
        identifier: Option<u64>,
        data_stream: Option<String>,
    },
    Fat { location: Option<String>, identifier: Option<u64> },
    ApfsContainer {
        location: Option<String>,
        volume_index: Option<u64>,
        password: Option<String>,
        recovery_password: Option<String>,
    },
    Apfs { location: Option<String>, identifier: Option<u64> },
    CoreStorage {
        location: Option<String>,
        volume_index: Option<u64>,
        password: Option<String>,
        recovery_password: Option<String>,
    },
    Luksde { password: Option<String>, key_data: Option<String> },
    Bde {
        password: Option<String>,
        recovery_password: Option<String>,
        startup_key: Option<String>,
    },
    Vshadow { location: Option<String>, store_index: Option<u64> },
    Zip { location: String },
    Tar { location: String },
    Cpio { location: String },
}

impl Layer {
    pub fn type_indicator(&self) -> TypeIndicator {
        match self {
            Layer::Os { .. } => TypeIndicator::Os,
            Layer::Raw => TypeIndicator::Raw,
            Layer::DataRange { .. } => TypeIndicator::DataRange,
            Layer::CompressedStream { .. } => TypeIndicator::CompressedStream,
            Layer::EncodedStream { .. } => TypeIndicator::EncodedStream,
            Layer::Gzip => TypeIndicator::Gzip,
            Layer::Gpt { .. } => TypeIndicator::Gpt,
            Layer::Apm { .. } => TypeIndicator::Apm,
            Layer::TskPartition { .. } => TypeIndicator::TskPartition,
            Layer::Tsk { .. } => TypeIndicator::Tsk,
            Layer::Ntfs { .. } => TypeIndicator::Ntfs,
            Layer::Ext { .. } => TypeIndicator::Ext,
            Layer::Xfs { .. } => TypeIndicator::Xfs,
            Layer::Hfs { .. } => TypeIndicator::Hfs,
            Layer::Fat { .. } => TypeIndicator::Fat,
            Layer::ApfsContainer { .. } => TypeIndicator::ApfsContainer,
            Layer::Apfs { .. } => TypeIndicator::Apfs,
            Layer::CoreStorage { .. } => TypeIndicator::CoreStorage,
            Layer::Luksde { .. } => TypeIndicator::Luksde,
            Layer::Bde { .. } => TypeIndicator::Bde,
            Layer::Vshadow { .. } => TypeIndicator::Vshadow,
            Layer::Zip { .. } => TypeIndicator::Zip,
            Layer::Tar { .. } => TypeIndicator::Tar,
            Layer::Cpio { .. } => TypeIndicator::Cpio,
        }
    }

    /// Present attributes, sorted by name
    pub fn attributes(&self) -> Vec<(&'static str, AttributeValue)> {
        let list = AttributeList::new();
        let list = match self {
            Layer::Os { location }
            | Layer::Zip { location }
            | Layer::Tar { location }
            | Layer::Cpio { location } => list.string("location", location),
            Layer::Raw | Layer::Gzip => list,
            Layer::DataRange {
                range_offset,
                range_size,
            } => list
                .int("range_offset", *range_offset)
                .int("range_size", *range_size),
            Layer::CompressedStream { compression_method } => {
                list.string("compression_method", compression_method)
            }
            Layer::EncodedStream { encoding_method } => {
                list.string("encoding_method", encoding_method)
            }
            Layer::Gpt {
                location,
                entry_index,
            }
            | Layer::Apm {
                location,
                entry_index,
            } => list
                .opt_string("location", location)
                .opt_int("entry_index", *entry_index),
            Layer::TskPartition {
                location,
                part_index,
                start_offset,
            } => list
                .opt_string("location", location)
                .opt_int("part_index", *part_index)
                .opt_int("start_offset", *start_offset),
            Layer::Tsk {
                location,
                inode,
                data_stream,
            } => list
                .opt_string("location", location)
                .opt_int("inode", *inode)
                .opt_string("data_stream", data_stream),
            Layer::Ntfs {
                location,
                mft_entry,
                mft_attribute,
                data_stream,
            } => list
                .opt_string("location", location)
                .opt_int("mft_entry", *mft_entry)
                .opt_int("mft_attribute", *mft_attribute)
                .opt_string("data_stream", data_stream),
            Layer::Ext { location, inode } | Layer::Xfs { location, inode } => list
                .opt_string("location", location)
                .opt_int("inode", *inode),
            Layer::Hfs {
                location,
                identifier,
                data_stream,
            } => list
                .opt_string("location", location)
                .opt_int("identifier", *identifier)
                .opt_string("data_stream", data_stream),
            Layer::Fat {
                location,
                identifier,
            }
            | Layer::Apfs {
                location,
                identifier,
            } => list
                .opt_string("location", location)
                .opt_int("identifier", *identifier),
            Layer::ApfsContainer {
                location,
                volume_index,
                password,
                recovery_password,
            }
            | Layer::CoreStorage {
                location,
                volume_index,
                password,
                recovery_password,
            } => list
                .opt_string("location", location)
                .opt_int("volume_index", *volume_index)
                .opt_string("password", password)
                .opt_string("recovery_password", recovery_password),
            Layer::Luksde { password, key_data } => list
                .opt_string("password", password)
                .opt_string("key_data", key_data),
            Layer::Bde {
                password,
                recovery_password,
                startup_key,
            } => list
                .opt_string("password", password)
                .opt_string("recovery_password", recovery_password)
                .opt_string("startup_key", startup_key),
            Layer::Vshadow {
                location,
                store_index,
            } => list
                .opt_string("location", location)
                .opt_int("store_index", *store_index),
        };
        list.into_sorted()
    }

    /// Location attribute, when the layer has one
    pub fn location(&self) -> Option<&str> {
        match self {
            Layer::Os { location }
            | Layer::Zip { location }
            | Layer::Tar { location }
            | Layer::Cpio { location } => Some(location),
            Layer::Gpt { location, .. }
            | Layer::Apm { location, .. }
            | Layer::TskPartition { location, .. }
            | Layer::Tsk { location, .. }
            | Layer::Ntfs { location, .. }
            | Layer::Ext { location, .. }
            | Layer::Xfs { location, .. }
            | Layer::Hfs { location, .. }
            | Layer::Fat { location, .. }
            | Layer::ApfsContainer { location, .. }
            | Layer::Apfs { location, .. }
            | Layer::CoreStorage { location, .. }
            | Layer::Vshadow { location, .. } => location.as_deref(),
            _ => None,
        }
    }

    /// Field-level rules that the type system cannot express
    fn validate(&self) -> Result<()> {
        let ti = self.type_indicator();
        let need_one = |has_location: bool, has_id: bool, id_name: &str| {
            if has_location || has_id {
                Ok(())
            } else {
                Err(VfsError::PathSpec(format!("{ti}: missing location and {id_name}")))
            }
        };
        match self {
            Layer::Os { location }
            | Layer::Zip { location }
            | Layer::Tar { location }
            | Layer::Cpio { location } if location.is_empty() => {
                Err(VfsError::PathSpec(format!("{ti}: empty location")))
            }
            Layer::CompressedStream { compression_method } if compression_method.is_empty() => {
                Err(VfsError::PathSpec(format!("{ti}: empty compression method")))
            }
            Layer::EncodedStream { encoding_method } if encoding_method.is_empty() => {
                Err(VfsError::PathSpec(format!("{ti}: empty encoding method")))
            }
            Layer::Tsk { location, inode, .. }
            | Layer::Ext { location, inode }
            | Layer::Xfs { location, inode } => need_one(location.is_some(), inode.is_some(), "inode"),
            Layer::Ntfs {
                location,
                mft_entry,
                ..
            } => need_one(location.is_some(), mft_entry.is_some(), "MFT entry"),
            Layer::Hfs {
                location,
                identifier,
                ..
            }
            | Layer::Fat {
                location,
                identifier,
            }
            | Layer::Apfs {
                location,
                identifier,
            } => need_one(location.is_some(), identifier.is_some(), "identifier"),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// PathSpec - a node in the chain
// =============================================================================

/// Immutable node of a path specification chain
#[derive(Debug, Clone)]
pub struct PathSpec {
    layer: Layer,
    parent: Option<Arc<PathSpec>>,
    comparable: OnceLock<String>,
}

impl PathSpec {
    /// Create a node; relative layer kinds require a parent, root kinds forbid one
    pub fn new(layer: Layer, parent: Option<Arc<PathSpec>>) -> Result<Arc<PathSpec>> {
        Self::build(layer, parent).map(Arc::new)
    }

    pub(crate) fn build(layer: Layer, parent: Option<Arc<PathSpec>>) -> Result<PathSpec> {
        let ti = layer.type_indicator();
        match (&parent, ti.is_root()) {
            (None, false) => {
                return Err(VfsError::PathSpec(format!("{ti}: missing parent")));
            }
            (Some(_), true) => {
                return Err(VfsError::PathSpec(format!("{ti}: root layer does not take a parent")));
            }
            _ => {}
        }
        layer.validate()?;
        Ok(PathSpec {
            layer,
            parent,
            comparable: OnceLock::new(),
        })
    }

    /// OS file at `location`
    pub fn os(location: impl Into<String>) -> Result<Arc<PathSpec>> {
        Self::new(
            Layer::Os {
                location: location.into(),
            },
            None,
        )
    }

    /// Convenience for layering `layer` on top of `self`
    pub fn child(self: &Arc<Self>, layer: Layer) -> Result<Arc<PathSpec>> {
        Self::new(layer, Some(Arc::clone(self)))
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn type_indicator(&self) -> TypeIndicator {
        self.layer.type_indicator()
    }

    pub fn parent(&self) -> Option<&Arc<PathSpec>> {
        self.parent.as_ref()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn location(&self) -> Option<&str> {
        self.layer.location()
    }

    pub fn attributes(&self) -> Vec<(&'static str, AttributeValue)> {
        self.layer.attributes()
    }

    /// Number of nodes from here down to the root, inclusive
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// Nodes from root to self
    pub fn chain(&self) -> Vec<&PathSpec> {
        let mut nodes = Vec::with_capacity(self.depth());
        let mut current = Some(self);
        while let Some(node) = current {
            nodes.push(node);
            current = node.parent.as_deref();
        }
        nodes.reverse();
        nodes
    }

    /// Comparable form of this node alone
    ///
    /// String values are escaped so a value can never contain the `, ` or
    /// newline that delimit attributes and nodes.
    fn node_comparable(&self) -> String {
        let mut line = format!("type: {}", self.type_indicator());
        for (name, value) in self.attributes() {
            match value {
                AttributeValue::Int(v) => line.push_str(&format!(", {name}: {v}")),
                AttributeValue::Str(v) => line.push_str(&format!(", {name}: {}", escape_comparable(&v))),
            }
        }
        line.push('\n');
        line
    }

    /// Root-to-self concatenation of every node's comparable form
    pub fn comparable(&self) -> &str {
        self.comparable.get_or_init(|| {
            let mut text = self
                .parent
                .as_ref()
                .map(|p| p.comparable().to_string())
                .unwrap_or_default();
            text.push_str(&self.node_comparable());
            text
        })
    }

    /// Cache key of the file system this node lives in
    ///
    /// All entries of one file system share the parent chain and layer kind,
    /// and differ only in their own coordinates.
    pub fn file_system_key(&self) -> String {
        let mut key = self
            .parent
            .as_ref()
            .map(|p| p.comparable().to_string())
            .unwrap_or_default();
        key.push_str(&format!("type: {}\n", self.type_indicator()));
        key
    }
}

/// Backslash-escape the delimiters of the comparable form
fn escape_comparable(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            ',' => escaped.push_str("\\,"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl PartialEq for PathSpec {
    fn eq(&self, other: &Self) -> bool {
        self.comparable() == other.comparable()
    }
}

impl Eq for PathSpec {}

impl Hash for PathSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparable().hash(state);
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.comparable())
    }
}
