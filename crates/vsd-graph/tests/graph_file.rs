//! Loading editor graph files from disk and validating them against a catalog
//! composed from files.

use std::fs;
use std::path::Path;

use vsd_graph::{validate, GraphInstance, ValidationIssue};

const CATALOG: &str = r#"{
    "nodes": [
        {"name": "stm32f746", "category": "SoC/stm32",
         "interfaces": [
            {"name": "gpio0", "type": "gpio", "direction": "inout", "maxConnectionsCount": -1},
            {"name": "i2c1", "type": "i2c", "direction": "inout", "maxConnectionsCount": -1}
         ]},
        {"name": "LED", "category": "IO/LED",
         "interfaces": [{"name": "gpio", "type": "gpio", "direction": "inout", "maxConnectionsCount": 1}]},
        {"name": "TMP108", "category": "Sensors/Thermometer/TI",
         "urls": {"rdp": "https://designer.antmicro.com/hardware/devices/ti_tmp108"},
         "additionalData": {"compats": ["ti,tmp108"]},
         "interfaces": [{"name": "i2c", "type": ["i2c", "smbus"], "direction": "inout"}]}
    ]
}"#;

const ADDRESSES: &str = r#"{
    "mods": [
        {"names": ["LED"], "add_properties": [{"name": "address (gpio)", "type": "hex", "default": "0x0"}]},
        {"names": ["TMP108"], "add_properties": [{"name": "address (i2c)", "type": "hex", "default": "0x48"}]}
    ]
}"#;

const GRAPH: &str = r#"{
    "graph": {
        "id": "f3c1",
        "name": "demo-board",
        "nodes": [
            {"id": "n-soc", "name": "stm32f746",
             "interfaces": [{"id": "s-gpio", "name": "gpio0"}, {"id": "s-i2c", "name": "i2c1"}]},
            {"id": "n-1", "name": "LED", "instanceName": "led0",
             "properties": [{"name": "address (gpio)", "value": "0x7"}],
             "interfaces": [{"id": "l-gpio", "name": "gpio"}]},
            {"id": "n-2", "name": "TMP108", "instanceName": "thermo0",
             "interfaces": [{"id": "t-i2c", "name": "i2c"}]}
        ],
        "connections": [
            {"id": "c1", "from": "s-gpio", "to": "l-gpio"},
            {"id": "c2", "from": "t-i2c", "to": "s-i2c"}
        ]
    }
}"#;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn validate_graph_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write(dir.path(), "components.json", CATALOG);
    let mod_path = write(dir.path(), "addresses.json", ADDRESSES);
    let graph_path = write(dir.path(), "demo.json", GRAPH);

    let catalog = vsd_spec::compose_files(&catalog_path, &[mod_path]).unwrap();
    let graph = GraphInstance::load(&graph_path).unwrap();
    let validated = validate(&graph, &catalog).unwrap();

    assert_eq!(validated.board_name(), "demo_board");
    let links = validated.root_neighbours();
    let summary: Vec<_> = links
        .iter()
        .map(|l| (l.root_interface, l.node_interface, l.node.label()))
        .collect();
    assert_eq!(
        summary,
        vec![("gpio0", "gpio", "led0"), ("i2c1", "i2c", "thermo0")]
    );
    let thermo = validated.node_by_label("thermo0").unwrap();
    assert_eq!(thermo.interface_address("i2c"), Some(0x48));
    assert_eq!(thermo.spec.model_name(), Some("ti_tmp108"));
}

#[test]
fn unnamed_nodes_are_labelled_after_their_category() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write(dir.path(), "components.json", CATALOG);
    let mod_path = write(dir.path(), "addresses.json", ADDRESSES);
    let catalog = vsd_spec::compose_files(&catalog_path, &[mod_path]).unwrap();
    let unnamed = GRAPH
        .replace(r#""instanceName": "led0","#, "")
        .replace(r#""instanceName": "thermo0","#, "");
    let graph = GraphInstance::from_json_str(&unnamed).unwrap();
    assert_eq!(graph.node(2).unwrap().label, "tmp108_2");

    let validated = validate(&graph, &catalog).unwrap();
    assert_eq!(validated.board_root().unwrap().label(), "stm32_soc");
    assert_eq!(validated.node_by_label("led_1").unwrap().type_name(), "LED");
    let thermo = validated.node_by_label("ti_2").unwrap();
    assert_eq!(thermo.interface_address("i2c"), Some(0x48));
    assert!(validated.node_by_label("tmp108_2").is_none());
}

#[test]
fn without_address_mod_the_property_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write(dir.path(), "components.json", CATALOG);
    let catalog = vsd_spec::compose_files(&catalog_path, &[] as &[&Path]).unwrap();
    let graph = GraphInstance::from_json_str(GRAPH).unwrap();

    let err = validate(&graph, &catalog).unwrap_err();
    assert_eq!(
        err.issues,
        vec![ValidationIssue::UnknownProperty {
            label: "led0".into(),
            property: "address (gpio)".into(),
        }]
    );
}

#[test]
fn validation_leaves_graph_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write(dir.path(), "components.json", CATALOG);
    let mod_path = write(dir.path(), "addresses.json", ADDRESSES);
    let catalog = vsd_spec::compose_files(&catalog_path, &[mod_path]).unwrap();
    let graph = GraphInstance::from_json_str(GRAPH).unwrap();
    let before = graph.clone();
    let _ = validate(&graph, &catalog);
    assert_eq!(graph, before);
    // The thermometer had no explicit address; the graph still has none.
    assert!(graph.node(2).unwrap().properties.is_empty());
}
