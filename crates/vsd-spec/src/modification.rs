//! Specification modification files.
//!
//! A modification is an additive patch over the catalog:
//!
//! ```json
//! {
//!   "metadata": {"key": "value"},
//!   "add_nodes": [{"name": "...", "category": "..."}],
//!   "mods": [{"names": ["LED"], "add_properties": [...], "add_interface": [...]}]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SpecCompositionError};
use crate::node::{first_duplicate, InterfaceSpec, NodeTypeSpec, PropertySpec};

/// One ordered unit applied to a base catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecModification {
    /// Catalog-level metadata keys to overwrite.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Whole node types to insert.
    #[serde(default)]
    pub add_nodes: Vec<NodeTypeSpec>,
    /// Members appended to existing node types.
    #[serde(default)]
    pub mods: Vec<ModEntry>,
}

/// Properties and interfaces to append to every named node type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModEntry {
    pub names: Vec<String>,
    #[serde(default)]
    pub add_properties: Vec<PropertySpec>,
    #[serde(default)]
    pub add_interface: Vec<InterfaceSpec>,
}

impl SpecModification {
    /// Parse and schema-check a modification. `origin` names it in error messages.
    pub fn from_json_str(json: &str, origin: &str) -> Result<Self> {
        let modification: SpecModification =
            serde_json::from_str(json).map_err(|e| malformed(origin, e.to_string()))?;
        modification.check(origin)?;
        Ok(modification)
    }

    /// Load a modification file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecCompositionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content, &path.display().to_string())
    }

    /// Schema rules `serde` cannot express.
    pub fn check(&self, origin: &str) -> Result<()> {
        if let Some(name) = first_duplicate(self.add_nodes.iter().map(|n| n.name.as_str())) {
            return Err(malformed(origin, format!("node type '{name}' added twice")));
        }
        for node in &self.add_nodes {
            if node.name.trim().is_empty() {
                return Err(malformed(origin, "added node type has an empty name".into()));
            }
            if let Some(member) = node.duplicate_member() {
                return Err(malformed(
                    origin,
                    format!("added node type '{}' declares '{member}' twice", node.name),
                ));
            }
        }
        for (i, entry) in self.mods.iter().enumerate() {
            if entry.names.is_empty() {
                return Err(malformed(origin, format!("mods[{i}] names no node types")));
            }
            let props = entry.add_properties.iter().map(|p| p.name.as_str());
            let ifaces = entry.add_interface.iter().map(|i| i.name.as_str());
            if let Some(member) = first_duplicate(props).or_else(|| first_duplicate(ifaces)) {
                return Err(malformed(origin, format!("mods[{i}] lists '{member}' twice")));
            }
        }
        Ok(())
    }
}

fn malformed(origin: &str, detail: String) -> SpecCompositionError {
    SpecCompositionError::MalformedModification {
        origin: origin.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_modification() {
        let json = r#"{
            "metadata": {"notifyWhenChanged": true},
            "add_nodes": [{"name": "Button", "category": "IO/Button"}],
            "mods": [{
                "names": ["LED", "Button"],
                "add_properties": [{"name": "address (gpio)", "type": "hex", "default": "0x0"}],
                "add_interface": [{"name": "gpio", "type": "gpio", "direction": "inout"}]
            }]
        }"#;
        let m = SpecModification::from_json_str(json, "inline").unwrap();
        assert_eq!(m.add_nodes.len(), 1);
        assert_eq!(m.mods[0].names, vec!["LED", "Button"]);
        assert_eq!(m.mods[0].add_interface[0].name, "gpio");
    }

    #[test]
    fn empty_modification_is_valid() {
        let m = SpecModification::from_json_str("{}", "inline").unwrap();
        assert_eq!(m, SpecModification::default());
    }

    #[test]
    fn reject_unknown_top_level_key() {
        let err = SpecModification::from_json_str(r#"{"remove_nodes": []}"#, "x.json").unwrap_err();
        match err {
            SpecCompositionError::MalformedModification { origin, .. } => assert_eq!(origin, "x.json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reject_mod_without_names() {
        let json = r#"{"mods": [{"names": [], "add_properties": []}]}"#;
        assert!(SpecModification::from_json_str(json, "inline").is_err());
    }

    #[test]
    fn reject_property_without_type() {
        let json = r#"{"mods": [{"names": ["LED"], "add_properties": [{"name": "x"}]}]}"#;
        assert!(SpecModification::from_json_str(json, "inline").is_err());
    }

    #[test]
    fn reject_node_added_twice() {
        let json = r#"{"add_nodes": [{"name": "A"}, {"name": "A"}]}"#;
        assert!(SpecModification::from_json_str(json, "inline").is_err());
    }
}
