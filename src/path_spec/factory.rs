//! Path specification factory and serialized form
//!
//! Builds layers from a type string plus a name/value map, and uses the same
//! path to read the nested key-value form callers persist:
//!
//! ```json
//! {
//!   "type_indicator": "COMPRESSED_STREAM",
//!   "compression_method": "bzip2",
//!   "parent": { "type_indicator": "OS", "location": "/cases/log.bz2" }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::attributes::{AttributeReader, AttributeValue};
use super::{Layer, PathSpec};
use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};

const TYPE_INDICATOR_KEY: &str = "type_indicator";
const PARENT_KEY: &str = "parent";

impl Layer {
    /// Build a layer from its kind and attribute map, rejecting unknown names
    pub fn from_attributes(
        type_indicator: TypeIndicator,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<Layer> {
        let mut r = AttributeReader::new(type_indicator, attributes);
        let layer = match type_indicator {
            TypeIndicator::Os => Layer::Os {
                location: r.string("location")?,
            },
            TypeIndicator::Raw => Layer::Raw,
            TypeIndicator::DataRange => Layer::DataRange {
                range_offset: r.int("range_offset")?,
                range_size: r.int("range_size")?,
            },
            TypeIndicator::CompressedStream => Layer::CompressedStream {
                compression_method: r.string("compression_method")?,
            },
            TypeIndicator::EncodedStream => Layer::EncodedStream {
                encoding_method: r.string("encoding_method")?,
            },
            TypeIndicator::Gzip => Layer::Gzip,
            TypeIndicator::Gpt => Layer::Gpt {
                location: r.opt_string("location")?,
                entry_index: r.opt_int("entry_index")?,
            },
            TypeIndicator::Apm => Layer::Apm {
                location: r.opt_string("location")?,
                entry_index: r.opt_int("entry_index")?,
            },
            TypeIndicator::TskPartition => Layer::TskPartition {
                location: r.opt_string("location")?,
                part_index: r.opt_int("part_index")?,
                start_offset: r.opt_int("start_offset")?,
            },
            TypeIndicator::Tsk => Layer::Tsk {
                location: r.opt_string("location")?,
                inode: r.opt_int("inode")?,
                data_stream: r.opt_string("data_stream")?,
            },
            TypeIndicator::Ntfs => Layer::Ntfs {
                location: r.opt_string("location")?,
                mft_entry: r.opt_int("mft_entry")?,
                mft_attribute: r.opt_int("mft_attribute")?,
                data_stream: r.opt_string("data_stream")?,
            },
            TypeIndicator::Ext => Layer::Ext {
                location: r.opt_string("location")?,
                inode: r.opt_int("inode")?,
            },
            TypeIndicator::Xfs => Layer::Xfs {
                location: r.opt_string("location")?,
                inode: r.opt_int("inode")?,
            },
            TypeIndicator::Hfs => Layer::Hfs {
                location: r.opt_string("location")?,
                identifier: r.opt_int("identifier")?,
                data_stream: r.opt_string("data_stream")?,
            },
            TypeIndicator::Fat => Layer::Fat {
                location: r.opt_string("location")?,
                identifier: r.opt_int("identifier")?,
            },
            TypeIndicator::ApfsContainer => Layer::ApfsContainer {
                location: r.opt_string("location")?,
                volume_index: r.opt_int("volume_index")?,
                password: r.opt_string("password")?,
                recovery_password: r.opt_string("recovery_password")?,
            },
            TypeIndicator::Apfs => Layer::Apfs {
                location: r.opt_string("location")?,
                identifier: r.opt_int("identifier")?,
            },
            TypeIndicator::CoreStorage => Layer::CoreStorage {
                location: r.opt_string("location")?,
                volume_index: r.opt_int("volume_index")?,
                password: r.opt_string("password")?,
                recovery_password: r.opt_string("recovery_password")?,
            },
            TypeIndicator::Luksde => Layer::Luksde {
                password: r.opt_string("password")?,
                key_data: r.opt_string("key_data")?,
            },
            TypeIndicator::Bde => Layer::Bde {
                password: r.opt_string("password")?,
                recovery_password: r.opt_string("recovery_password")?,
                startup_key: r.opt_string("startup_key")?,
            },
            TypeIndicator::Vshadow => Layer::Vshadow {
                location: r.opt_string("location")?,
                store_index: r.opt_int("store_index")?,
            },
            TypeIndicator::Zip => Layer::Zip {
                location: r.string("location")?,
            },
            TypeIndicator::Tar => Layer::Tar {
                location: r.string("location")?,
            },
            TypeIndicator::Cpio => Layer::Cpio {
                location: r.string("location")?,
            },
        };
        r.finish()?;
        Ok(layer)
    }
}

impl PathSpec {
    /// Factory entry point: type string, attributes and optional parent
    pub fn from_attributes(
        type_indicator: &str,
        attributes: BTreeMap<String, AttributeValue>,
        parent: Option<Arc<PathSpec>>,
    ) -> Result<Arc<PathSpec>> {
        let type_indicator: TypeIndicator = type_indicator.parse()?;
        let layer = Layer::from_attributes(type_indicator, attributes)?;
        PathSpec::new(layer, parent)
    }

    /// Serialize the chain as nested JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| VfsError::PathSpec(format!("failed to serialize path specification: {e}")))
    }

    /// Rebuild a chain from its nested JSON form
    pub fn from_json(json: &str) -> Result<Arc<PathSpec>> {
        let value: Value = serde_json::from_str(json)?;
        from_value(value).map(Arc::new)
    }
}

fn from_value(value: Value) -> Result<PathSpec> {
    let Value::Object(mut map) = value else {
        return Err(VfsError::PathSpec("serialized path specification must be an object".into()));
    };

    let type_indicator = match map.remove(TYPE_INDICATOR_KEY) {
        Some(Value::String(s)) => s.parse::<TypeIndicator>()?,
        Some(_) => return Err(VfsError::PathSpec("type_indicator must be a string".into())),
        None => return Err(VfsError::PathSpec("missing type_indicator".into())),
    };

    let parent = match map.remove(PARENT_KEY) {
        None | Some(Value::Null) => None,
        Some(nested) => Some(Arc::new(from_value(nested)?)),
    };

    let mut attributes = BTreeMap::new();
    for (name, value) in map {
        let value = match value {
            Value::String(s) => AttributeValue::Str(s),
            Value::Number(n) => n.as_u64().map(AttributeValue::Int).ok_or_else(|| {
                VfsError::PathSpec(format!(
                    "{type_indicator}: attribute {name} must be a non-negative integer"
                ))
            })?,
            _ => {
                return Err(VfsError::PathSpec(format!(
                    "{type_indicator}: attribute {name} has an unsupported value type"
                )))
            }
        };
        attributes.insert(name, value);
    }

    let layer = Layer::from_attributes(type_indicator, attributes)?;
    PathSpec::build(layer, parent)
}

impl Serialize for PathSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let attributes = self.attributes();
        if attributes
            .iter()
            .any(|(name, _)| *name == TYPE_INDICATOR_KEY || *name == PARENT_KEY)
        {
            return Err(S::Error::custom("reserved attribute name"));
        }

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TYPE_INDICATOR_KEY, self.type_indicator().as_str())?;
        for (name, value) in &attributes {
            match value {
                AttributeValue::Int(v) => map.serialize_entry(name, v)?,
                AttributeValue::Str(v) => map.serialize_entry(name, v)?,
            }
        }
        if let Some(parent) = self.parent() {
            map.serialize_entry(PARENT_KEY, parent.as_ref())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PathSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(value).map_err(D::Error::custom)
    }
}
