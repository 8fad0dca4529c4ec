//! End-to-end generation against the bundled blinky-temperature template and a
//! scratch SoC resource tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use serde_json::json;
use vsd_codegen::{generate, generate_app, BoardTarget, GenerationError, TemplateSource};
use vsd_graph::{validate, GraphInstance};
use vsd_spec::{compose, Catalog, Direction, EffectiveCatalog, InterfaceSpec, NodeTypeSpec, PropertySpec, PropertyType, TypeTags};

fn template_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demo/templates/blinky-temperature")
}

fn catalog() -> EffectiveCatalog {
    let gpio = || InterfaceSpec::new("gpio", Direction::Inout, TypeTags::new(["gpio"]));
    let i2c = || InterfaceSpec::new("i2c", Direction::Inout, TypeTags::new(["i2c"]));
    let mut soc = NodeTypeSpec::new("STM32F746", "SoC/stm32")
        .with_interface(InterfaceSpec::new("gpioa", Direction::Inout, TypeTags::new(["gpio"])).with_max_connections(-1))
        .with_interface(InterfaceSpec::new("i2c1", Direction::Inout, TypeTags::new(["i2c"])).with_max_connections(-1));
    soc.urls.insert("rdp".into(), json!("https://designer.antmicro.com/hardware/socs/stm32f746"));
    let mut thermo = NodeTypeSpec::new("TMP108", "Sensors/Thermometer/TI")
        .with_interface(i2c())
        .with_property(PropertySpec::new("address (i2c)", PropertyType::Hex).with_default(json!("0x48")));
    thermo.urls.insert("rdp".into(), json!("https://designer.antmicro.com/hardware/devices/ti_tmp108"));
    thermo.additional_data = Some(json!({"compats": ["ti,tmp108"]}));
    let base = Catalog {
        nodes: vec![
            soc,
            NodeTypeSpec::new("LED", "IO/LED")
                .with_interface(gpio().with_max_connections(1))
                .with_property(PropertySpec::new("address (gpio)", PropertyType::Hex)),
            thermo,
        ],
        ..Default::default()
    };
    compose(&base, &[]).unwrap()
}

/// LED and thermometer with no SoC and no connections.
fn loose_graph() -> GraphInstance {
    let mut graph = GraphInstance::default();
    graph.add_node("LED", "led0");
    graph.add_node("TMP108", "thermo0");
    graph
}

fn board_graph() -> GraphInstance {
    let mut graph = GraphInstance::default();
    graph.name = Some("demo board".into());
    let soc = graph.add_node("STM32F746", "soc");
    let led = graph.add_node("LED", "led0");
    let thermo = graph.add_node("TMP108", "thermo0");
    graph.set_property(led, "address (gpio)", json!("0x5"));
    graph.connect((soc, "gpioa"), (led, "gpio"));
    graph.connect((soc, "i2c1"), (thermo, "i2c"));
    graph
}

fn read_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.insert(path.strip_prefix(root).unwrap().to_path_buf(), fs::read(&path).unwrap());
            }
        }
    }
    files
}

struct Resources {
    _dir: tempfile::TempDir,
    target: BoardTarget,
}

fn resources(board: &str) -> Resources {
    let dir = tempfile::tempdir().unwrap();
    let soc_dir = dir.path().join("resources/zephyr-data/socs/stm32f746");
    fs::create_dir_all(&soc_dir).unwrap();
    fs::write(
        soc_dir.join("configs.yaml"),
        r#"
vendor: st
defconfig_file: boards/st/disco/disco_defconfig
remove_defconfig_flags: [CONFIG_SERIAL]
add_defconfig_flags: [CONFIG_GPIO=y]
additional_files:
  - boards/st/disco/pinctrl.dtsi
  - boards/st/disco/missing.dtsi
board_socs:
  - name: stm32f746xx
"#,
    )
    .unwrap();
    fs::write(soc_dir.join("stm32f746.dts"), "/dts-v1/;\n#include <st/f7/stm32f746.dtsi>\n").unwrap();
    fs::write(
        soc_dir.join("overlay.dts"),
        "/ {\n\tchosen {\n\t\tzephyr,console = &usart1;\n\t};\n};\n",
    )
    .unwrap();
    let zephyr = dir.path().join("zephyr");
    fs::create_dir_all(zephyr.join("boards/st/disco")).unwrap();
    fs::write(zephyr.join("boards/st/disco/disco_defconfig"), "CONFIG_ARM_MPU=y\nCONFIG_SERIAL=y\n").unwrap();
    fs::write(zephyr.join("boards/st/disco/pinctrl.dtsi"), "// pins\n").unwrap();

    let target = BoardTarget {
        board_name: board.to_string(),
        boards_dir: dir.path().join("boards"),
        resources_dir: dir.path().join("resources"),
        zephyr_base: zephyr,
    };
    Resources { _dir: dir, target }
}

#[test]
fn template_expands_one_body_per_node() {
    let catalog = catalog();
    let graph = loose_graph();
    let validated = validate(&graph, &catalog).unwrap();
    let out = tempfile::tempdir().unwrap();
    let source = TemplateSource {
        template_dir: template_dir(),
        output_dir: out.path().join("app"),
        force: false,
    };

    let app = generate_app(&validated, &source).unwrap();
    assert_eq!(app.rendered, vec![PathBuf::from("src/main.c")]);
    assert_eq!(app.labels.get("leds"), ["led0"]);
    assert_eq!(app.labels.get("thermometers"), ["thermo0"]);

    let main = fs::read_to_string(source.output_dir.join("src/main.c")).unwrap();
    assert_eq!(main.matches("toggle_led_state(&led0)").count(), 1);
    assert_eq!(main.matches("get_temperature(&thermo0)").count(), 1);
    assert!(main.contains("#define NODE_LED0 DT_NODELABEL(led0)\n#define NODE_THERMO0 DT_NODELABEL(thermo0)\n"));
    assert!(main.contains("generated for the Untitled_graph board"));
    assert!(!main.contains("//!"));
    assert!(!main.contains("{{"));

    // Untouched files are copied byte for byte.
    assert_eq!(
        fs::read(source.output_dir.join("src/utils.c")).unwrap(),
        fs::read(template_dir().join("src/utils.c")).unwrap()
    );
}

#[test]
fn generation_is_deterministic() {
    let catalog = catalog();
    let graph = board_graph();
    let validated = validate(&graph, &catalog).unwrap();

    let mut trees = Vec::new();
    for _ in 0..2 {
        let res = resources("demo_board");
        let source = TemplateSource {
            template_dir: template_dir(),
            output_dir: res.target.boards_dir.with_file_name("app"),
            force: false,
        };
        let artifacts = generate(&validated, &res.target, Some(&source)).unwrap();
        trees.push((read_tree(&artifacts.board_dir), read_tree(&source.output_dir)));
    }
    assert_eq!(trees[0], trees[1]);
}

#[test]
fn board_directory_contents() {
    let catalog = catalog();
    let graph = board_graph();
    let validated = validate(&graph, &catalog).unwrap();
    let board = validated.board_name();
    assert_eq!(board, "demo_board");
    let res = resources(&board);

    let artifacts = generate(&validated, &res.target, None).unwrap();
    assert!(artifacts.app.is_none());
    let files = read_tree(&artifacts.board_dir);
    let names: Vec<_> = files.keys().map(|p| p.display().to_string()).collect();
    assert_eq!(
        names,
        vec!["Kconfig.demo_board", "board.yml", "demo_board.dts", "demo_board_defconfig", "pinctrl.dtsi"]
    );

    let text = |name: &str| String::from_utf8(files[Path::new(name)].clone()).unwrap();
    assert_eq!(text("demo_board_defconfig"), "CONFIG_ARM_MPU=y\nCONFIG_GPIO=y\n");
    let dts = text("demo_board.dts");
    assert!(dts.starts_with("/dts-v1/;\n"));
    assert!(dts.contains("\n\n// overlay\n\n/ {\n\tchosen {"));
    assert!(dts.contains("\t\tled0: led_0 {\n\t\t\tgpios = <&gpioa 5 GPIO_ACTIVE_HIGH>;"));
    assert!(dts.contains("&i2c1 {\n\tstatus = \"okay\";\n\tthermo0: ti_tmp108@48 {"));
    assert!(dts.ends_with("/ {\n\tchosen {\n\t\tzephyr,shell-uart = &usart1;\n\t};\n};\n"));
}

#[test]
fn unwired_nodes_stay_out_of_the_application() {
    let catalog = catalog();
    let mut graph = board_graph();
    let loose = graph.add_node("LED", "led_loose");
    graph.set_property(loose, "address (gpio)", json!("0x7"));
    let validated = validate(&graph, &catalog).unwrap();
    let res = resources("demo_board");
    let source = TemplateSource {
        template_dir: template_dir(),
        output_dir: res.target.boards_dir.with_file_name("app"),
        force: false,
    };

    let artifacts = generate(&validated, &res.target, Some(&source)).unwrap();
    let app = artifacts.app.unwrap();
    assert_eq!(app.labels.get("leds"), ["led0"]);
    assert_eq!(app.labels.get("thermometers"), ["thermo0"]);

    let main = fs::read_to_string(source.output_dir.join("src/main.c")).unwrap();
    let dts = fs::read_to_string(artifacts.board_dir.join("demo_board.dts")).unwrap();
    assert!(main.contains("DT_NODELABEL(led0)"));
    assert!(dts.contains("led0:"));
    assert!(!main.contains("led_loose"));
    assert!(!dts.contains("led_loose"));
}

#[test]
fn forced_regeneration_leaves_no_stale_files() {
    let catalog = catalog();
    let graph = loose_graph();
    let validated = validate(&graph, &catalog).unwrap();
    let out = tempfile::tempdir().unwrap();
    let output_dir = out.path().join("app");
    fs::create_dir_all(output_dir.join("src")).unwrap();
    fs::write(output_dir.join("src/stale.c"), "old").unwrap();

    let mut source = TemplateSource {
        template_dir: template_dir(),
        output_dir: output_dir.clone(),
        force: false,
    };
    let err = generate_app(&validated, &source).unwrap_err();
    assert!(matches!(err, GenerationError::OutputExists { .. }));
    assert!(output_dir.join("src/stale.c").exists());

    source.force = true;
    generate_app(&validated, &source).unwrap();
    assert!(!output_dir.join("src/stale.c").exists());
    assert_eq!(
        read_tree(&output_dir).keys().cloned().collect::<Vec<_>>(),
        read_tree(&template_dir()).keys().cloned().collect::<Vec<_>>()
    );
    let leftovers: Vec<_> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["app".to_string()]);
}

#[test]
fn board_requires_root() {
    let catalog = catalog();
    let graph = loose_graph();
    let validated = validate(&graph, &catalog).unwrap();
    let res = resources("loose");
    let err = generate(&validated, &res.target, None).unwrap_err();
    assert!(matches!(err, GenerationError::MissingBoardRoot));
    assert!(!res.target.board_dir().exists());
}

#[test]
fn unknown_soc_resources() {
    let mut base = catalog().composed().clone();
    base.nodes.push(NodeTypeSpec::new("nrf52840", "SoC/nrf"));
    let catalog = compose(&base, &[]).unwrap();
    let mut graph = GraphInstance::default();
    graph.add_node("nrf52840", "soc");
    let validated = validate(&graph, &catalog).unwrap();
    let res = resources("nrf");
    match generate(&validated, &res.target, None) {
        Err(GenerationError::MissingSocResources { soc, .. }) => assert_eq!(soc, "nrf52840"),
        other => panic!("unexpected result: {other:?}"),
    }
}
