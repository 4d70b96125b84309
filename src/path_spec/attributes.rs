//! Scalar attribute values and the helpers that move them in and out of layers

use std::collections::BTreeMap;
use std::fmt;

use crate::definitions::TypeIndicator;
use crate::error::{Result, VfsError};

/// One attribute value of a path specification layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    Int(u64),
    Str(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(value) => write!(f, "{value}"),
            AttributeValue::Str(value) => f.write_str(value),
        }
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

// =============================================================================
// Outbound: layer -> named values
// =============================================================================

/// Collects the present attributes of a layer
#[derive(Default)]
pub(crate) struct AttributeList {
    entries: Vec<(&'static str, AttributeValue)>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(mut self, name: &'static str, value: &str) -> Self {
        self.entries.push((name, AttributeValue::Str(value.to_string())));
        self
    }

    pub fn opt_string(self, name: &'static str, value: &Option<String>) -> Self {
        match value {
            Some(v) => self.string(name, v),
            None => self,
        }
    }

    pub fn int(mut self, name: &'static str, value: u64) -> Self {
        self.entries.push((name, AttributeValue::Int(value)));
        self
    }

    pub fn opt_int(self, name: &'static str, value: Option<u64>) -> Self {
        match value {
            Some(v) => self.int(name, v),
            None => self,
        }
    }

    /// Attributes sorted by name
    pub fn into_sorted(mut self) -> Vec<(&'static str, AttributeValue)> {
        self.entries.sort_by(|a, b| a.0.cmp(b.0));
        self.entries
    }
}

// =============================================================================
// Inbound: named values -> layer fields
// =============================================================================

/// Takes typed values out of an attribute map; leftovers are unknown attributes
pub(crate) struct AttributeReader {
    type_indicator: TypeIndicator,
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeReader {
    pub fn new(type_indicator: TypeIndicator, values: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            type_indicator,
            values,
        }
    }

    pub fn opt_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.values.remove(name) {
            None => Ok(None),
            Some(AttributeValue::Str(value)) => Ok(Some(value)),
            Some(AttributeValue::Int(_)) => Err(VfsError::PathSpec(format!(
                "{}: attribute {name} must be a string",
                self.type_indicator
            ))),
        }
    }

    pub fn opt_int(&mut self, name: &str) -> Result<Option<u64>> {
        match self.values.remove(name) {
            None => Ok(None),
            Some(AttributeValue::Int(value)) => Ok(Some(value)),
            Some(AttributeValue::Str(_)) => Err(VfsError::PathSpec(format!(
                "{}: attribute {name} must be an integer",
                self.type_indicator
            ))),
        }
    }

    pub fn string(&mut self, name: &str) -> Result<String> {
        self.opt_string(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn int(&mut self, name: &str) -> Result<u64> {
        self.opt_int(name)?.ok_or_else(|| self.missing(name))
    }

    /// Fail on any attribute the layer kind does not define
    pub fn finish(self) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        Err(VfsError::PathSpec(format!(
            "{}: unsupported attributes: {}",
            self.type_indicator,
            names.join(", ")
        )))
    }

    fn missing(&self, name: &str) -> VfsError {
        VfsError::PathSpec(format!("{}: missing attribute {name}", self.type_indicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_sorted_and_skips_none() {
        let attrs = AttributeList::new()
            .opt_string("location", &Some("/a".into()))
            .opt_int("inode", None)
            .int("entry_index", 2)
            .into_sorted();
        let names: Vec<_> = attrs.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["entry_index", "location"]);
    }

    #[test]
    fn test_reader_type_checks_and_leftovers() {
        let mut values = BTreeMap::new();
        values.insert("location".to_string(), AttributeValue::Int(3));
        values.insert("bogus".to_string(), AttributeValue::from("x"));
        let mut reader = AttributeReader::new(TypeIndicator::Tsk, values);
        assert!(reader.opt_string("location").is_err());
        let err = reader.finish().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
