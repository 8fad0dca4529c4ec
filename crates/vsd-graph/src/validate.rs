//! Graph validation against the effective catalog.
//!
//! Every rule is checked on every node and connection; issues are collected
//! and returned together rather than stopping at the first one.

use std::collections::BTreeMap;

use serde_json::Value;
use vsd_spec::{EffectiveCatalog, NodeTypeSpec, PropertySpec, PropertyType};

use crate::error::{ValidationError, ValidationIssue};
use crate::instance::{
    board_name_from, category_label, Connection, Endpoint, GraphInstance, NodeInstance, UNTITLED_BOARD,
};

/// A graph that passed validation, bound to the catalog it was checked against.
#[derive(Debug, Clone)]
pub struct ValidatedGraph<'a> {
    graph: &'a GraphInstance,
    catalog: &'a EffectiveCatalog,
    specs: Vec<&'a NodeTypeSpec>,
    /// Node labels, unnamed nodes labelled after their category.
    labels: Vec<String>,
    by_label: BTreeMap<String, usize>,
    /// Property values with catalog defaults filled in.
    properties: Vec<BTreeMap<String, Value>>,
    root: Option<usize>,
}

/// A node of a validated graph together with its type and resolved properties.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub index: usize,
    pub instance: &'a NodeInstance,
    pub spec: &'a NodeTypeSpec,
    label: &'a str,
    properties: &'a BTreeMap<String, Value>,
}

/// A direct connection from the board root to one of its neighbours.
#[derive(Debug, Clone, Copy)]
pub struct RootLink<'a> {
    pub root_interface: &'a str,
    pub node_interface: &'a str,
    pub node: NodeView<'a>,
}

/// Check `graph` against `catalog`.
pub fn validate<'a>(
    graph: &'a GraphInstance,
    catalog: &'a EffectiveCatalog,
) -> Result<ValidatedGraph<'a>, ValidationError> {
    let mut issues = Vec::new();
    let mut specs = Vec::with_capacity(graph.node_count());
    let mut properties = Vec::with_capacity(graph.node_count());
    let labels: Vec<String> = graph
        .nodes()
        .map(|node| resolve_label(node, catalog.get(&node.type_name)))
        .collect();

    for (node, label) in graph.nodes().zip(&labels) {
        let spec = catalog.get(&node.type_name).filter(|s| !s.is_abstract);
        match spec {
            Some(spec) => {
                properties.push(check_properties(node, label, spec, &mut issues));
                specs.push(Some(spec));
            }
            None => {
                issues.push(ValidationIssue::UnknownNodeType {
                    label: label.clone(),
                    type_name: node.type_name.clone(),
                });
                properties.push(node.properties.clone());
                specs.push(None);
            }
        }
    }

    let mut label_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in &labels {
        *label_counts.entry(label.as_str()).or_default() += 1;
    }
    for (label, count) in label_counts {
        if count > 1 {
            issues.push(ValidationIssue::DuplicateLabel {
                label: label.to_string(),
                count,
            });
        }
    }

    let roots: Vec<usize> = specs
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_some_and(NodeTypeSpec::is_board_root))
        .map(|(i, _)| i)
        .collect();
    if roots.len() > 1 {
        issues.push(ValidationIssue::MultipleBoardRoots {
            labels: roots.iter().filter_map(|i| labels.get(*i)).cloned().collect(),
        });
    }

    for unresolved in graph.unresolved() {
        issues.push(ValidationIssue::DanglingConnection {
            connection: unresolved.position,
            interface_id: unresolved.interface_id.clone(),
        });
    }

    check_connections(graph, &labels, &specs, &mut issues);

    if !issues.is_empty() {
        tracing::debug!(issues = issues.len(), "graph validation failed");
        return Err(ValidationError { issues });
    }

    let mut by_label = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        by_label.entry(label.clone()).or_insert(index);
    }
    Ok(ValidatedGraph {
        graph,
        catalog,
        specs: specs.into_iter().flatten().collect(),
        labels,
        by_label,
        properties,
        root: roots.first().copied(),
    })
}

/// The explicit label, else one built from the type's category. Types
/// without a category keep the label derived from their name.
fn resolve_label(node: &NodeInstance, spec: Option<&NodeTypeSpec>) -> String {
    match spec.and_then(|s| s.category.as_deref()) {
        Some(category) if !node.named && !category.is_empty() => category_label(category, &node.id),
        _ => node.label.clone(),
    }
}

fn check_properties(
    node: &NodeInstance,
    label: &str,
    spec: &NodeTypeSpec,
    issues: &mut Vec<ValidationIssue>,
) -> BTreeMap<String, Value> {
    let mut resolved = BTreeMap::new();
    for (name, value) in &node.properties {
        let Some(prop) = spec.property(name) else {
            issues.push(ValidationIssue::UnknownProperty {
                label: label.to_string(),
                property: name.clone(),
            });
            continue;
        };
        // An explicit null means "not set" and falls back to the default.
        if value.is_null() {
            continue;
        }
        if let Some(expected) = mismatch(prop, value) {
            issues.push(ValidationIssue::TypeMismatch {
                label: label.to_string(),
                property: name.clone(),
                expected,
                found: describe(value),
            });
        }
        resolved.insert(name.clone(), value.clone());
    }
    for prop in &spec.properties {
        if let (false, Some(default)) = (resolved.contains_key(&prop.name), &prop.default) {
            resolved.insert(prop.name.clone(), default.clone());
        }
    }
    resolved
}

fn check_connections(
    graph: &GraphInstance,
    labels: &[String],
    specs: &[Option<&NodeTypeSpec>],
    issues: &mut Vec<ValidationIssue>,
) {
    let mut counts: BTreeMap<(usize, &str), usize> = BTreeMap::new();

    for (position, conn) in graph.connections() {
        let Connection { from, to } = conn;
        if let Some(end) = [from, to].into_iter().find(|end| end.node >= specs.len()) {
            issues.push(ValidationIssue::DanglingConnection {
                connection: position,
                interface_id: format!("node {}.{}", end.node, end.interface),
            });
            continue;
        }
        *counts.entry((from.node, from.interface.as_str())).or_default() += 1;
        *counts.entry((to.node, to.interface.as_str())).or_default() += 1;

        let from_iface = endpoint_interface(labels, specs, position, from, issues);
        let to_iface = endpoint_interface(labels, specs, position, to, issues);
        let (Some(a), Some(b)) = (from_iface, to_iface) else {
            continue;
        };

        let from_name = endpoint_name(labels, from);
        let to_name = endpoint_name(labels, to);
        if !a.type_tags.compatible_with(&b.type_tags) {
            issues.push(ValidationIssue::IncompatibleInterfaceTypes {
                connection: position,
                from: from_name.clone(),
                to: to_name.clone(),
                from_types: a.type_tags.to_string(),
                to_types: b.type_tags.to_string(),
            });
        }
        if !a.direction.pairs_with(b.direction) {
            issues.push(ValidationIssue::DirectionConflict {
                connection: position,
                from: from_name,
                to: to_name,
                from_direction: a.direction,
                to_direction: b.direction,
            });
        }
    }

    for ((node, interface), count) in counts {
        let Some(iface) = specs.get(node).copied().flatten().and_then(|s| s.interface(interface)) else {
            continue;
        };
        if let Some(limit) = iface.connection_limit() {
            if count > limit {
                issues.push(ValidationIssue::ConnectionLimitExceeded {
                    label: labels.get(node).cloned().unwrap_or_default(),
                    interface: interface.to_string(),
                    limit,
                    count,
                });
            }
        }
    }
}

/// The declared interface behind an endpoint. Endpoints on unknown node types
/// are skipped silently, the node itself is already reported.
fn endpoint_interface<'s>(
    labels: &[String],
    specs: &[Option<&'s NodeTypeSpec>],
    position: usize,
    end: &Endpoint,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'s vsd_spec::InterfaceSpec> {
    let spec = specs.get(end.node).copied().flatten()?;
    let iface = spec.interface(&end.interface);
    if iface.is_none() {
        issues.push(ValidationIssue::UnknownInterface {
            connection: position,
            label: labels.get(end.node).cloned().unwrap_or_default(),
            interface: end.interface.clone(),
        });
    }
    iface
}

fn endpoint_name(labels: &[String], end: &Endpoint) -> String {
    let label = labels.get(end.node).map(String::as_str).unwrap_or("?");
    format!("{label}.{}", end.interface)
}

/// `Some(expected)` when `value` does not fit the declared property type.
fn mismatch(prop: &PropertySpec, value: &Value) -> Option<String> {
    let ok = match &prop.kind {
        PropertyType::Text | PropertyType::Constant => value.is_string(),
        PropertyType::Select => {
            value.is_string() && (prop.values.is_empty() || prop.values.contains(value))
        }
        PropertyType::Hex => value.as_str().and_then(parse_hex).is_some(),
        PropertyType::Number | PropertyType::Slider => value.is_number(),
        PropertyType::Integer => value.is_i64() || value.is_u64(),
        PropertyType::Bool | PropertyType::Checkbox => value.is_boolean(),
        PropertyType::List => value.is_array(),
        PropertyType::Other(_) => true,
    };
    if ok {
        return None;
    }
    Some(match &prop.kind {
        PropertyType::Select if !prop.values.is_empty() => {
            let allowed: Vec<String> = prop.values.iter().map(Value::to_string).collect();
            format!("one of [{}]", allowed.join(", "))
        }
        PropertyType::Hex => "a hexadecimal string".to_string(),
        kind => format!("a {kind} value"),
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(a) => format!("list of {} item(s)", a.len()),
        Value::Object(_) => "object".to_string(),
    }
}

/// Parse a hexadecimal string, with or without a `0x` prefix.
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

impl<'a> ValidatedGraph<'a> {
    pub fn graph(&self) -> &'a GraphInstance {
        self.graph
    }

    pub fn catalog(&self) -> &'a EffectiveCatalog {
        self.catalog
    }

    pub fn node(&self, index: usize) -> Option<NodeView<'_>> {
        Some(NodeView {
            index,
            instance: self.graph.node(index)?,
            spec: *self.specs.get(index)?,
            label: self.labels.get(index).map(String::as_str)?,
            properties: self.properties.get(index)?,
        })
    }

    /// Nodes in graph order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeView<'_>> {
        (0..self.graph.node_count()).filter_map(move |i| self.node(i))
    }

    pub fn node_by_label(&self, label: &str) -> Option<NodeView<'_>> {
        self.node(*self.by_label.get(label)?)
    }

    /// The SoC node the board is built around, if the graph has one.
    pub fn board_root(&self) -> Option<NodeView<'_>> {
        self.node(self.root?)
    }

    /// Connections of the board root, grouped by root interface in declaration
    /// order, then in file order.
    pub fn root_neighbours(&self) -> Vec<RootLink<'_>> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let Some(root_node) = self.graph.node(root) else {
            return Vec::new();
        };
        let mut links = Vec::new();
        for root_iface in &root_node.interfaces {
            for (_, conn) in self.graph.connections() {
                let Some((own, other)) = conn.other_side(root) else {
                    continue;
                };
                if &own.interface != root_iface || other.node == root {
                    continue;
                }
                if let Some(node) = self.node(other.node) {
                    links.push(RootLink {
                        root_interface: own.interface.as_str(),
                        node_interface: other.interface.as_str(),
                        node,
                    });
                }
            }
        }
        links
    }

    /// Board name: the graph name, else the board root's type name, else a
    /// fixed placeholder; separators replaced with `_`.
    pub fn board_name(&self) -> String {
        let name = self
            .graph
            .name
            .clone()
            .or_else(|| self.board_root().map(|r| r.instance.type_name.clone()))
            .unwrap_or_else(|| UNTITLED_BOARD.to_string());
        board_name_from(&name)
    }
}

impl<'a> NodeView<'a> {
    pub fn label(&self) -> &'a str {
        self.label
    }

    pub fn type_name(&self) -> &'a str {
        &self.instance.type_name
    }

    /// Resolved property value, defaults included.
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &'a BTreeMap<String, Value> {
        self.properties
    }

    /// Address assigned on `interface`, read from the `address (<interface>)`
    /// property.
    pub fn interface_address(&self, interface: &str) -> Option<u64> {
        let key = format!("address ({interface})");
        let (name, value) = self.properties.iter().find(|(name, _)| name.contains(&key))?;
        let parsed = value.as_str().and_then(parse_hex);
        if parsed.is_none() {
            tracing::error!(node = %self.label(), property = %name, %value, "missing or invalid address");
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vsd_spec::{compose, Catalog, Direction, InterfaceSpec, TypeTags};

    fn catalog() -> EffectiveCatalog {
        let gpio = |dir| InterfaceSpec::new("gpio", dir, TypeTags::new(["gpio"]));
        let base = Catalog {
            nodes: vec![
                NodeTypeSpec::new("stm32", "SoC/stm32")
                    .with_interface(
                        InterfaceSpec::new("gpio0", Direction::Inout, TypeTags::new(["gpio"]))
                            .with_max_connections(-1),
                    )
                    .with_interface(InterfaceSpec::new("i2c1", Direction::Inout, TypeTags::new(["i2c"]))),
                NodeTypeSpec::new("LED", "IO/LED")
                    .with_interface(gpio(Direction::Inout).with_max_connections(1))
                    .with_property(PropertySpec::new("address (gpio)", PropertyType::Hex))
                    .with_property(
                        PropertySpec::new("color", PropertyType::Text).with_default(json!("red")),
                    ),
                NodeTypeSpec::new("Source", "Test/Source")
                    .with_interface(InterfaceSpec::new("out", Direction::Output, TypeTags::new(["gpio"]))),
                NodeTypeSpec::new("Sink", "Test/Sink")
                    .with_interface(InterfaceSpec::new("in", Direction::Input, TypeTags::new(["gpio"]))),
                {
                    let mut abs = NodeTypeSpec::new("Sensor", "Sensors");
                    abs.is_abstract = true;
                    abs
                },
            ],
            ..Default::default()
        };
        compose(&base, &[]).unwrap()
    }

    fn issues(graph: &GraphInstance) -> Vec<ValidationIssue> {
        let catalog = catalog();
        validate(graph, &catalog).unwrap_err().issues
    }

    #[test]
    fn valid_graph_fills_defaults() {
        let catalog = catalog();
        let mut graph = GraphInstance::default();
        let soc = graph.add_node("stm32", "soc");
        let led = graph.add_node("LED", "led0");
        graph.set_property(led, "address (gpio)", json!("0x5"));
        graph.connect((soc, "gpio0"), (led, "gpio"));

        let validated = validate(&graph, &catalog).unwrap();
        let led = validated.node_by_label("led0").unwrap();
        assert_eq!(led.property("color"), Some(&json!("red")));
        assert_eq!(led.interface_address("gpio"), Some(5));
        assert_eq!(validated.board_root().unwrap().label(), "soc");
        let links = validated.root_neighbours();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].root_interface, "gpio0");
        assert_eq!(links[0].node_interface, "gpio");
        assert_eq!(links[0].node.label(), "led0");
    }

    #[test]
    fn rootless_disconnected_graph_is_valid() {
        let catalog = catalog();
        let mut graph = GraphInstance::default();
        graph.add_node("LED", "led0");
        let validated = validate(&graph, &catalog).unwrap();
        assert!(validated.board_root().is_none());
        assert!(validated.root_neighbours().is_empty());
        assert_eq!(validated.board_name(), "Untitled_graph");
    }

    #[test]
    fn board_name_sources() {
        let catalog = catalog();
        let mut graph = GraphInstance::default();
        graph.add_node("stm32", "soc");
        assert_eq!(validate(&graph, &catalog).unwrap().board_name(), "stm32");
        graph.name = Some("my demo-board".into());
        assert_eq!(validate(&graph, &catalog).unwrap().board_name(), "my_demo_board");
    }

    #[test]
    fn output_to_output_is_direction_conflict() {
        let mut graph = GraphInstance::default();
        let a = graph.add_node("Source", "a");
        let b = graph.add_node("Source", "b");
        graph.connect((a, "out"), (b, "out"));
        assert_eq!(
            issues(&graph),
            vec![ValidationIssue::DirectionConflict {
                connection: 0,
                from: "a.out".into(),
                to: "b.out".into(),
                from_direction: Direction::Output,
                to_direction: Direction::Output,
            }]
        );
    }

    #[test]
    fn input_accepts_one_connection_by_default() {
        let mut graph = GraphInstance::default();
        let a = graph.add_node("Source", "a");
        let b = graph.add_node("Source", "b");
        let sink = graph.add_node("Sink", "sink");
        graph.connect((a, "out"), (sink, "in"));
        graph.connect((b, "out"), (sink, "in"));
        assert_eq!(
            issues(&graph),
            vec![ValidationIssue::ConnectionLimitExceeded {
                label: "sink".into(),
                interface: "in".into(),
                limit: 1,
                count: 2,
            }]
        );
    }

    #[test]
    fn all_issues_collected() {
        let mut graph = GraphInstance::default();
        let soc = graph.add_node("stm32", "soc");
        graph.add_node("stm32", "soc");
        let led = graph.add_node("LED", "led0");
        graph.add_node("Sensor", "abstract0");
        graph.add_node("Buzzer", "buzz");
        graph.set_property(led, "address (gpio)", json!("zz"));
        graph.set_property(led, "brightness", json!(3));
        graph.connect((soc, "i2c1"), (led, "gpio"));
        graph.connect((soc, "uart0"), (led, "gpio"));

        let found = issues(&graph);
        let has = |pred: &dyn Fn(&ValidationIssue) -> bool| found.iter().any(pred);
        assert!(has(&|i| matches!(i, ValidationIssue::UnknownNodeType { type_name, .. } if type_name == "Buzzer")));
        assert!(has(&|i| matches!(i, ValidationIssue::UnknownNodeType { type_name, .. } if type_name == "Sensor")));
        assert!(has(&|i| matches!(i, ValidationIssue::TypeMismatch { property, .. } if property == "address (gpio)")));
        assert!(has(&|i| matches!(i, ValidationIssue::UnknownProperty { property, .. } if property == "brightness")));
        assert!(has(&|i| matches!(i, ValidationIssue::DuplicateLabel { label, count: 2 } if label == "soc")));
        assert!(has(&|i| matches!(i, ValidationIssue::MultipleBoardRoots { .. })));
        assert!(has(&|i| matches!(i, ValidationIssue::IncompatibleInterfaceTypes { connection: 0, .. })));
        assert!(has(&|i| matches!(i, ValidationIssue::UnknownInterface { interface, .. } if interface == "uart0")));
        assert!(has(&|i| matches!(i, ValidationIssue::ConnectionLimitExceeded { label, .. } if label == "led0")));
    }

    #[test]
    fn dangling_connection_reported() {
        let catalog = catalog();
        let graph = GraphInstance::from_json_str(
            r#"{"graph": {"id": "g", "nodes": [
                {"id": "n1", "name": "LED", "instanceName": "led0", "interfaces": [{"id": "i1", "name": "gpio"}]}
            ], "connections": [{"from": "i1", "to": "nowhere"}]}}"#,
        )
        .unwrap();
        let err = validate(&graph, &catalog).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::DanglingConnection {
                connection: 0,
                interface_id: "nowhere".into(),
            }]
        );
        assert!(err.to_string().contains("1 issue(s)"));
    }

    #[test]
    fn connection_to_missing_node_is_dangling() {
        let mut graph = GraphInstance::default();
        let soc = graph.add_node("stm32", "soc");
        graph.connect((soc, "gpio0"), (7, "gpio"));
        assert_eq!(
            issues(&graph),
            vec![ValidationIssue::DanglingConnection {
                connection: 0,
                interface_id: "node 7.gpio".into(),
            }]
        );
    }

    #[test]
    fn select_and_scalar_types() {
        let mut prop = PropertySpec::new("mode", PropertyType::Select);
        prop.values = vec![json!("fast"), json!("slow")];
        assert!(mismatch(&prop, &json!("fast")).is_none());
        assert_eq!(mismatch(&prop, &json!("medium")).unwrap(), r#"one of ["fast", "slow"]"#);
        let int = PropertySpec::new("n", PropertyType::Integer);
        assert!(mismatch(&int, &json!(3)).is_none());
        assert!(mismatch(&int, &json!(3.5)).is_some());
        let other = PropertySpec::new("x", PropertyType::Other("custom".into()));
        assert!(mismatch(&other, &json!({"a": 1})).is_none());
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("0x48"), Some(0x48));
        assert_eq!(parse_hex("1F"), Some(0x1f));
        assert_eq!(parse_hex("0x"), None);
        assert_eq!(parse_hex("g1"), None);
    }
}
