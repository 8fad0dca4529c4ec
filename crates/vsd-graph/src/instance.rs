//! Arena representation of a design graph.
//!
//! Nodes live in a `Vec` in file order and are addressed by index; edges are
//! index pairs with interface names. Labels index the arena.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::document::{GraphBody, GraphDocument};
use crate::error::Result;

/// Board name used when neither the graph nor its board root provides one.
pub const UNTITLED_BOARD: &str = "Untitled_graph";

/// A placed node: type reference, label, and concrete property values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInstance {
    /// Editor-assigned id.
    pub id: String,
    pub type_name: String,
    /// `instanceName` when set, else derived from the type name until
    /// validation replaces it with the category-based label.
    pub label: String,
    /// Whether `label` was given explicitly.
    pub named: bool,
    /// Values as given in the graph file.
    pub properties: BTreeMap<String, Value>,
    /// Interface names in declaration order.
    pub interfaces: Vec<String>,
}

/// One side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub node: usize,
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Connection {
    /// The endpoint opposite to `node`, if the connection touches it.
    pub fn other_side(&self, node: usize) -> Option<(&Endpoint, &Endpoint)> {
        if self.from.node == node {
            Some((&self.from, &self.to))
        } else if self.to.node == node {
            Some((&self.to, &self.from))
        } else {
            None
        }
    }
}

/// A connection whose endpoint ids did not resolve to any node interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedConnection {
    /// Position in the file's connection list.
    pub position: usize,
    pub interface_id: String,
}

/// Serializes to a canonical form (sorted property keys, file order
/// everywhere else) suitable for hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphInstance {
    pub id: String,
    pub name: Option<String>,
    nodes: Vec<NodeInstance>,
    by_label: BTreeMap<String, usize>,
    /// Resolved connections, paired with their position in the file.
    connections: Vec<(usize, Connection)>,
    unresolved: Vec<UnresolvedConnection>,
}

impl GraphInstance {
    /// Build the arena from a parsed document.
    ///
    /// Never fails on graph content: unresolvable connections are recorded and
    /// reported by validation along with every other issue.
    pub fn from_document(doc: &GraphDocument) -> Result<Self> {
        Ok(Self::from_body(doc.main_graph()?))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_document(&GraphDocument::from_json_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_document(&GraphDocument::load(path)?)
    }

    fn from_body(body: &GraphBody) -> Self {
        let mut graph = GraphInstance {
            id: body.id.clone(),
            name: body.name.clone().filter(|n| !n.trim().is_empty()),
            ..Default::default()
        };
        let mut interface_owner: HashMap<&str, (usize, &str)> = HashMap::new();

        for entry in &body.nodes {
            let index = graph.nodes.len();
            let (label, named) = match &entry.instance_name {
                Some(name) if !name.trim().is_empty() => (sanitize_label(name), true),
                _ => (derived_label(&entry.name, &entry.id), false),
            };
            for iface in &entry.interfaces {
                interface_owner.insert(iface.id.as_str(), (index, iface.name.as_str()));
            }
            graph.by_label.entry(label.clone()).or_insert(index);
            graph.nodes.push(NodeInstance {
                id: entry.id.clone(),
                type_name: entry.name.clone(),
                label,
                named,
                properties: entry
                    .properties
                    .iter()
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect(),
                interfaces: entry.interfaces.iter().map(|i| i.name.clone()).collect(),
            });
        }

        for (position, conn) in body.connections.iter().enumerate() {
            let resolve = |id: &str| {
                interface_owner.get(id).map(|(node, name)| Endpoint {
                    node: *node,
                    interface: name.to_string(),
                })
            };
            match (resolve(&conn.from), resolve(&conn.to)) {
                (Some(from), Some(to)) => graph.connections.push((position, Connection { from, to })),
                (None, _) => graph.unresolved.push(UnresolvedConnection {
                    position,
                    interface_id: conn.from.clone(),
                }),
                (_, None) => graph.unresolved.push(UnresolvedConnection {
                    position,
                    interface_id: conn.to.clone(),
                }),
            }
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            connections = graph.connections.len(),
            unresolved = graph.unresolved.len(),
            "graph loaded"
        );
        graph
    }

    /// Add a node; used by tests and programmatic construction.
    pub fn add_node(&mut self, type_name: impl Into<String>, label: impl Into<String>) -> usize {
        let index = self.nodes.len();
        let label = label.into();
        self.by_label.entry(label.clone()).or_insert(index);
        self.nodes.push(NodeInstance {
            id: format!("node-{index}"),
            type_name: type_name.into(),
            label,
            named: true,
            properties: BTreeMap::new(),
            interfaces: Vec::new(),
        });
        index
    }

    /// Set a property value on an existing node.
    pub fn set_property(&mut self, node: usize, name: impl Into<String>, value: Value) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.properties.insert(name.into(), value);
        }
    }

    /// Connect two node interfaces, registering the interface names on the nodes.
    pub fn connect(
        &mut self,
        from: (usize, impl Into<String>),
        to: (usize, impl Into<String>),
    ) -> usize {
        let from = Endpoint {
            node: from.0,
            interface: from.1.into(),
        };
        let to = Endpoint {
            node: to.0,
            interface: to.1.into(),
        };
        for end in [&from, &to] {
            if let Some(n) = self.nodes.get_mut(end.node) {
                if !n.interfaces.contains(&end.interface) {
                    n.interfaces.push(end.interface.clone());
                }
            }
        }
        let position = self.connections.len() + self.unresolved.len();
        self.connections.push((position, Connection { from, to }));
        position
    }

    pub fn node(&self, index: usize) -> Option<&NodeInstance> {
        self.nodes.get(index)
    }

    /// First node carrying `label`.
    pub fn node_by_label(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInstance> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolved connections with their position in the file.
    pub fn connections(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.connections.iter().map(|(pos, c)| (*pos, c))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn unresolved(&self) -> &[UnresolvedConnection] {
        &self.unresolved
    }
}

/// Lowercase and map everything outside `[a-z0-9_]` to `_`.
pub fn sanitize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<type>_<last '-' segment of id>`, for nodes whose type is not in the catalog.
fn derived_label(type_name: &str, id: &str) -> String {
    let suffix = id.rsplit('-').next().unwrap_or(id);
    sanitize_label(&format!("{type_name}_{suffix}"))
}

/// `<last '/' segment of category>_<last '-' segment of id>`.
pub fn category_label(category: &str, id: &str) -> String {
    let leaf = category.rsplit('/').next().unwrap_or(category);
    let suffix = id.rsplit('-').next().unwrap_or(id);
    sanitize_label(&format!("{leaf}_{suffix}"))
}

/// Turn a graph or node name into a board name usable as a directory and
/// Zephyr board identifier.
pub fn board_name_from(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' || c == '+' { '_' } else { c })
        .collect()
}
