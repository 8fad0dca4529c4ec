//! Base component catalog as read from the components specification file.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SpecCompositionError};
use crate::node::NodeTypeSpec;

/// The component specification: catalog-level metadata plus node type entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub nodes: Vec<NodeTypeSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Catalog {
    /// Parse and check a catalog from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let catalog: Catalog =
            serde_json::from_str(json).map_err(|e| SpecCompositionError::MalformedCatalog {
                detail: e.to_string(),
            })?;
        catalog.check()?;
        Ok(catalog)
    }

    /// Load a catalog from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecCompositionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Node type names are unique, and member names are unique within each type.
    pub fn check(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(SpecCompositionError::DuplicateNodeType {
                    name: node.name.clone(),
                });
            }
            if let Some(member) = node.duplicate_member() {
                return Err(SpecCompositionError::MalformedCatalog {
                    detail: format!("node type '{}' declares '{member}' twice", node.name),
                });
            }
        }
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&NodeTypeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut NodeTypeSpec> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// Pretty JSON with sorted keys and four-space indentation.
    pub fn to_json_pretty(&self) -> String {
        // Going through `Value` sorts object keys.
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        if value.serialize(&mut ser).is_err() {
            return value.to_string();
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}
