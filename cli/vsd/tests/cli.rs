//! End-to-end checks of the `vsd` binary's exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const CATALOG: &str = r#"{
    "nodes": [
        {"name": "stm32f746", "category": "SoC/stm32",
         "interfaces": [{"name": "gpioa", "direction": "inout", "type": "gpio"}]},
        {"name": "LED", "category": "IO/LED",
         "properties": [{"name": "address (gpio)", "type": "hex", "default": "0x0"}],
         "interfaces": [{"name": "gpio", "direction": "inout", "type": "gpio"}]}
    ]
}"#;

fn vsd(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vsd"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env_remove("ZEPHYR_BASE")
        .env_remove("ZEPHYR_SDK_INSTALL_DIR")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let resources = dir.path().join("visual-system-designer-resources");
    fs::create_dir_all(&resources).unwrap();
    fs::write(resources.join("components-specification.json"), CATALOG).unwrap();
    dir
}

fn graph(dir: &Path, led_type: &str) -> String {
    let path = dir.join("graph.json");
    let json = format!(
        r#"{{"graph": {{"id": "g", "name": "demo",
            "nodes": [
                {{"id": "n-1", "name": "stm32f746", "interfaces": [{{"id": "i1", "name": "gpioa"}}]}},
                {{"id": "n-2", "name": "{led_type}", "properties": [{{"name": "address (gpio)", "value": "0x5"}}],
                  "interfaces": [{{"id": "i2", "name": "gpio"}}]}}
            ],
            "connections": [{{"id": "c", "from": "i1", "to": "i2"}}]}}}}"#
    );
    fs::write(&path, json).unwrap();
    path.display().to_string()
}

#[test]
fn validate_accepts_a_good_graph() {
    let ws = workspace();
    let out = vsd(ws.path(), &["validate", &graph(ws.path(), "LED")]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("valid"));
    assert!(stdout.contains("Board name:  demo"));
}

#[test]
fn validate_failure_exits_65() {
    let ws = workspace();
    let out = vsd(ws.path(), &["validate", &graph(ws.path(), "Buzzer")]);
    assert_eq!(out.status.code(), Some(65));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Buzzer"));
}

#[test]
fn modify_spec_unknown_target_exits_65() {
    let ws = workspace();
    let m = ws.path().join("mod.json");
    fs::write(
        &m,
        r#"{"mods": [{"names": ["Missing"], "add_properties": [{"name": "x", "type": "text"}]}]}"#,
    )
    .unwrap();
    let out = vsd(ws.path(), &["modify-spec", "--spec-mod", &m.display().to_string()]);
    assert_eq!(out.status.code(), Some(65));
}

#[test]
fn build_without_board_exits_3() {
    let ws = workspace();
    let out = Command::new(env!("CARGO_BIN_EXE_vsd"))
        .arg("--workspace")
        .arg(ws.path())
        .args(["build-zephyr", "demo"])
        .env("ZEPHYR_BASE", ws.path())
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn clean_and_info_succeed() {
    let ws = workspace();
    fs::create_dir_all(ws.path().join("boards/demo")).unwrap();
    assert!(vsd(ws.path(), &["info"]).status.success());
    assert!(vsd(ws.path(), &["clean", "demo"]).status.success());
    assert!(!ws.path().join("boards/demo").exists());
}
