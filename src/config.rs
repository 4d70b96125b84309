//! Runtime configuration for the resolver and its stream layers
//!
//! All fields have defaults, so an empty JSON object is a valid config:
//!
//! ```json
//! { "source_read_size": 1048576, "gzip_cache_size": 4194304 }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, VfsError};

/// Bytes pulled from a parent layer per transform feed (8MB)
pub const DEFAULT_SOURCE_READ_SIZE: usize = 8 * 1024 * 1024;

/// Maximum decoded bytes a gzip member keeps cached (2MB)
pub const DEFAULT_GZIP_CACHE_SIZE: usize = 2 * 1024 * 1024;

/// Tunables shared by every layer opened through one resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VfsConfig {
    /// Compressed/encoded bytes read from the parent per feed
    pub source_read_size: usize,
    /// Per-member decoded window size for gzip containers
    pub gzip_cache_size: usize,
    /// Compare gzip footers against decoded sizes while parsing
    pub verify_gzip_footers: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            source_read_size: DEFAULT_SOURCE_READ_SIZE,
            gzip_cache_size: DEFAULT_GZIP_CACHE_SIZE,
            verify_gzip_footers: true,
        }
    }
}

impl VfsConfig {
    /// Parse a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: VfsConfig = serde_json::from_str(json)
            .map_err(|e| VfsError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading VFS config");
        let json = fs::read_to_string(path)
            .map_err(|e| VfsError::from_io(format!("Failed to read config {}", path.display()), e))?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VfsError::Config(format!("failed to serialize config: {e}")))
    }

    /// Reject values no layer can work with
    pub fn validate(&self) -> Result<()> {
        if self.source_read_size == 0 {
            return Err(VfsError::Config("source_read_size must be non-zero".into()));
        }
        if self.gzip_cache_size == 0 {
            return Err(VfsError::Config("gzip_cache_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Builder-style override of the source read size
    pub fn with_source_read_size(mut self, size: usize) -> Self {
        self.source_read_size = size;
        self
    }

    /// Builder-style override of the gzip cache size
    pub fn with_gzip_cache_size(mut self, size: usize) -> Self {
        self.gzip_cache_size = size;
        self
    }
}
