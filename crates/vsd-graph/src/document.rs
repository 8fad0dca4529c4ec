//! On-disk graph file as saved by the diagram editor (dataflow JSON).
//!
//! Only the fields the compiler reads are modelled; positions and other editor
//! state are kept in `extra` so a document can be written back unchanged.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphFileError, Result};

/// Top-level graph file. Older files hold a single `graph`, newer ones a
/// `graphs` list with an `entryGraph` id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graphs: Vec<GraphBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_graph: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphBody {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A placed node. `name` is the node type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyEntry>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A connection between two interface ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphDocument {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GraphFileError::Malformed(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GraphFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// The graph to compile: `graph` if present, else the entry graph, else the
    /// first of `graphs`.
    pub fn main_graph(&self) -> Result<&GraphBody> {
        if let Some(graph) = &self.graph {
            return Ok(graph);
        }
        let entry = self
            .entry_graph
            .as_deref()
            .and_then(|id| self.graphs.iter().find(|g| g.id == id));
        entry.or_else(|| self.graphs.first()).ok_or(GraphFileError::Empty)
    }

    /// Canonical serialization: sorted keys, no insignificant whitespace.
    ///
    /// Two documents that differ only in key order or formatting produce the
    /// same text, which makes this suitable as a hashing input.
    pub fn canonical_json(&self) -> String {
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_graph_form() {
        let doc = GraphDocument::from_json_str(
            r#"{"graph": {"id": "g1", "name": "demo", "nodes": [], "connections": []}, "version": "20240723.13"}"#,
        )
        .unwrap();
        assert_eq!(doc.main_graph().unwrap().name.as_deref(), Some("demo"));
        assert!(doc.extra.contains_key("version"));
    }

    #[test]
    fn entry_graph_selected() {
        let doc = GraphDocument::from_json_str(
            r#"{"entryGraph": "b", "graphs": [{"id": "a", "name": "sub"}, {"id": "b", "name": "main"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.main_graph().unwrap().name.as_deref(), Some("main"));
    }

    #[test]
    fn empty_document_rejected() {
        let doc = GraphDocument::from_json_str("{}").unwrap();
        assert!(matches!(doc.main_graph(), Err(GraphFileError::Empty)));
    }

    #[test]
    fn canonical_json_ignores_formatting() {
        let a = GraphDocument::from_json_str(r#"{"graph": {"name": "x", "id": "1"}}"#).unwrap();
        let b = GraphDocument::from_json_str("{\n  \"graph\": {\"id\": \"1\",\n \"name\": \"x\"}\n}").unwrap();
        assert_eq!(a.canonical_json(), b.canonical_json());
    }
}
