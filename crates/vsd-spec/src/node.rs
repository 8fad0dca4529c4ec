//! Node type model: properties and interfaces declared by a catalog entry.
//!
//! The JSON shape follows the diagram editor's component specification, so
//! unknown keys are kept in `extra` maps and written back unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Direction of an interface on a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Accepts connections from outputs.
    Input,
    /// Drives inputs.
    Output,
    /// Bidirectional bus or pin.
    #[default]
    Inout,
}

impl Direction {
    /// Whether an endpoint with this direction may be connected to one with `other`.
    ///
    /// Two outputs never pair, and neither do two inputs.
    pub fn pairs_with(self, other: Direction) -> bool {
        !matches!(
            (self, other),
            (Direction::Output, Direction::Output) | (Direction::Input, Direction::Input)
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Inout => "inout",
        };
        f.write_str(s)
    }
}

/// Interface type tags. Written either as a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawTypeTags", into = "RawTypeTags")]
pub struct TypeTags(Vec<String>);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTypeTags {
    One(String),
    Many(Vec<String>),
}

impl From<RawTypeTags> for TypeTags {
    fn from(raw: RawTypeTags) -> Self {
        match raw {
            RawTypeTags::One(tag) => TypeTags(vec![tag]),
            RawTypeTags::Many(tags) => TypeTags(tags),
        }
    }
}

impl From<TypeTags> for RawTypeTags {
    fn from(tags: TypeTags) -> Self {
        let mut tags = tags.0;
        if tags.len() == 1 {
            RawTypeTags::One(tags.remove(0))
        } else {
            RawTypeTags::Many(tags)
        }
    }
}

impl TypeTags {
    /// Build from any list of tags.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeTags(tags.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Tag compatibility: untyped interfaces accept anything, otherwise the tag sets
    /// must share at least one entry.
    pub fn compatible_with(&self, other: &TypeTags) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }
        self.0.iter().any(|tag| other.0.contains(tag))
    }
}

impl fmt::Display for TypeTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<any>");
        }
        write!(f, "{}", self.0.join("|"))
    }
}

/// Declared type of a node property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    Text,
    Constant,
    Select,
    Hex,
    Number,
    Slider,
    Integer,
    Bool,
    Checkbox,
    List,
    /// Any type the validator does not know; accepts every value.
    Other(String),
}

impl From<String> for PropertyType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => PropertyType::Text,
            "constant" => PropertyType::Constant,
            "select" => PropertyType::Select,
            "hex" => PropertyType::Hex,
            "number" => PropertyType::Number,
            "slider" => PropertyType::Slider,
            "integer" => PropertyType::Integer,
            "bool" => PropertyType::Bool,
            "checkbox" => PropertyType::Checkbox,
            "list" => PropertyType::List,
            _ => PropertyType::Other(s),
        }
    }
}

impl From<PropertyType> for String {
    fn from(ty: PropertyType) -> Self {
        ty.as_str().to_string()
    }
}

impl PropertyType {
    pub fn as_str(&self) -> &str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Constant => "constant",
            PropertyType::Select => "select",
            PropertyType::Hex => "hex",
            PropertyType::Number => "number",
            PropertyType::Slider => "slider",
            PropertyType::Integer => "integer",
            PropertyType::Bool => "bool",
            PropertyType::Checkbox => "checkbox",
            PropertyType::List => "list",
            PropertyType::Other(s) => s,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named property on a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values for `select` properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            values: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// A named, directional connection point on a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    /// Placement hint for the editor (`left`, `right`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "TypeTags::is_empty")]
    pub type_tags: TypeTags,
    /// Raw limit as written in the catalog; `-1` means unbounded.
    #[serde(
        rename = "maxConnectionsCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_connections: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InterfaceSpec {
    pub fn new(name: impl Into<String>, direction: Direction, type_tags: TypeTags) -> Self {
        Self {
            name: name.into(),
            direction,
            side: None,
            type_tags,
            max_connections: None,
            extra: Map::new(),
        }
    }

    pub fn with_max_connections(mut self, max: i64) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Effective connection limit, `None` when unbounded.
    ///
    /// Inputs without an explicit limit accept a single connection.
    pub fn connection_limit(&self) -> Option<usize> {
        match self.max_connections {
            Some(n) if n < 0 => None,
            Some(n) => Some(n as usize),
            None if self.direction == Direction::Input => Some(1),
            None => None,
        }
    }
}

/// A catalog entry describing a class of hardware or software building block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceSpec>,
    #[serde(rename = "abstract", default, skip_serializing_if = "is_false")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_category: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub urls: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl NodeTypeSpec {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: Some(category.into()),
            properties: Vec::new(),
            interfaces: Vec::new(),
            is_abstract: false,
            is_category: false,
            extends: Vec::new(),
            urls: Map::new(),
            additional_data: None,
            extra: Map::new(),
        }
    }

    pub fn with_property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_interface(mut self, interface: InterfaceSpec) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceSpec> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Category path, `"Other"` when the entry declares none.
    pub fn category_path(&self) -> &str {
        self.category.as_deref().unwrap_or("Other")
    }

    /// Whether the category path starts with `prefix` on a segment boundary.
    pub fn in_category(&self, prefix: &str) -> bool {
        let category = self.category_path();
        category == prefix
            || category
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') || prefix.ends_with('/'))
    }

    /// A board root is the SoC a design is built around.
    pub fn is_board_root(&self) -> bool {
        self.category_path().starts_with("SoC")
    }

    /// Hardware model name: last path segment of the `rdp` URL.
    pub fn model_name(&self) -> Option<&str> {
        let url = self.urls.get("rdp")?.as_str()?;
        url.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Devicetree `compatible` strings from `additionalData.compats`.
    pub fn compats(&self) -> Vec<&str> {
        self.additional_data
            .as_ref()
            .and_then(|data| data.get("compats"))
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// First duplicated property or interface name, if any.
    pub fn duplicate_member(&self) -> Option<&str> {
        first_duplicate(self.properties.iter().map(|p| p.name.as_str()))
            .or_else(|| first_duplicate(self.interfaces.iter().map(|i| i.name.as_str())))
    }

    /// Append a property unless one with the same name already exists.
    ///
    /// Returns whether the property was added.
    pub fn merge_property(&mut self, property: &PropertySpec) -> bool {
        if self.property(&property.name).is_some() {
            return false;
        }
        self.properties.push(property.clone());
        true
    }

    /// Append an interface unless one with the same name already exists.
    pub fn merge_interface(&mut self, interface: &InterfaceSpec) -> bool {
        if self.interface(&interface.name).is_some() {
            return false;
        }
        self.interfaces.push(interface.clone());
        true
    }

    /// Whether `self` already contains everything `other` declares.
    ///
    /// Used to make re-adding an already present node type a no-op: the existing
    /// entry may have grown through later mods, but nothing in `other` may differ.
    pub fn subsumes(&self, other: &NodeTypeSpec) -> bool {
        self.name == other.name
            && self.category == other.category
            && self.is_abstract == other.is_abstract
            && self.is_category == other.is_category
            && self.extends == other.extends
            && self.urls == other.urls
            && self.additional_data == other.additional_data
            && self.extra == other.extra
            && other
                .properties
                .iter()
                .all(|p| self.property(&p.name) == Some(p))
            && other
                .interfaces
                .iter()
                .all(|i| self.interface(&i.name) == Some(i))
    }
}

pub(crate) fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::BTreeSet::new();
    names.into_iter().find(|name| !seen.insert(*name))
}
