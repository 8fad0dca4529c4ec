//! Devicetree fragments for nodes connected to the board root.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use regex::Regex;
use vsd_graph::RootLink;

use crate::error::TemplateError;
use crate::labels::{ListRule, THERMOMETER_MODELS};

/// Extra properties some bindings require beyond `compatible` and `reg`.
const REQUIRED_PROPERTIES: &[(&str, &str)] = &[("sensirion,sht4x", "repeatability = <2>;")];

/// Overlay fragments rendered from the board root's neighbours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    pub leds: String,
    pub sensors: String,
    /// Neighbours no fragment exists for, as `label (type): node_if -> root_if`.
    pub skipped: Vec<String>,
}

impl Overlay {
    pub fn from_links(links: &[RootLink<'_>]) -> Self {
        let led_rule = ListRule {
            categories: vec!["IO/LED".into()],
            models: Vec::new(),
        };
        let mut leds = Vec::new();
        let mut sensors = Vec::new();
        let mut skipped = Vec::new();
        for link in links {
            if led_rule.matches(&link.node) {
                leds.push(*link);
            } else if !link.node.spec.compats().is_empty() {
                sensors.push(*link);
            } else {
                skipped.push(format!(
                    "{} ({}): {} -> {}",
                    link.node.label(),
                    link.node.type_name(),
                    link.node_interface,
                    link.root_interface
                ));
            }
        }
        if !skipped.is_empty() {
            tracing::warn!(count = skipped.len(), "connections without devicetree support");
            for s in &skipped {
                tracing::warn!(" - {s}");
            }
        }
        Overlay {
            leds: leds_fragment(&leds),
            sensors: sensors.iter().map(sensor_fragment).collect(),
            skipped,
        }
    }
}

/// A `gpio-leds` node with one child per LED, then `status = "okay"` for every
/// GPIO controller used.
pub fn leds_fragment(leds: &[RootLink<'_>]) -> String {
    let mut children = String::new();
    let mut controllers = BTreeSet::new();
    let mut index = 0;
    for link in leds {
        let node = &link.node;
        let Some(pin) = node.interface_address("gpio") else {
            tracing::warn!(node = %node.label(), "no GPIO address, skipping LED");
            continue;
        };
        let _ = writeln!(children, "\t\t{}: led_{index} {{", node.label());
        let _ = writeln!(
            children,
            "\t\t\tgpios = <&{} {pin} GPIO_ACTIVE_HIGH>;",
            link.root_interface
        );
        let _ = writeln!(children, "\t\t\tlabel = \"{}\";", node.type_name());
        children.push_str("\t\t};\n");
        controllers.insert(link.root_interface);
        index += 1;
    }
    if controllers.is_empty() {
        return String::new();
    }

    let mut out = String::from("#include <zephyr/dt-bindings/gpio/gpio.h>\n");
    out.push_str("/ {\n\tleds {\n\t\tcompatible = \"gpio-leds\";\n");
    out.push_str(&children);
    out.push_str("\t};\n};\n");
    for controller in controllers {
        out.push_str(&enable(controller));
    }
    out
}

/// A bus child node under the root interface the sensor is connected to.
pub fn sensor_fragment(link: &RootLink<'_>) -> String {
    let node = &link.node;
    let name = node.spec.model_name().unwrap_or(node.type_name());
    let compats = node.spec.compats();
    let address = node.interface_address(link.node_interface);
    if address.is_none() {
        tracing::warn!(node = %node.label(), "no bus address, inserting without one");
    }
    let unit = address.map(|a| format!("@{a:x}")).unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(out, "&{} {{", link.root_interface);
    out.push_str("\tstatus = \"okay\";\n");
    let _ = writeln!(out, "\t{}: {name}{unit} {{", node.label());
    let quoted: Vec<String> = compats.iter().map(|c| format!("\"{c}\"")).collect();
    let _ = writeln!(out, "\t\tcompatible = {};", quoted.join(", "));
    if let Some(a) = address {
        let _ = writeln!(out, "\t\treg = <{a:#x}>;");
    }
    if is_thermometer(link) {
        out.push_str("\t\tfriendly-name = \"thermometer\";\n");
    }
    for (compat, property) in REQUIRED_PROPERTIES {
        if compats.contains(compat) {
            let _ = writeln!(out, "\t\t{property}");
        }
    }
    out.push_str("\t\tstatus = \"okay\";\n\t};\n};\n");
    out
}

fn is_thermometer(link: &RootLink<'_>) -> bool {
    ListRule {
        categories: vec!["Sensors/Thermometer".into()],
        models: THERMOMETER_MODELS.iter().map(|m| m.to_string()).collect(),
    }
    .matches(&link.node)
}

fn enable(controller: &str) -> String {
    format!("&{controller} {{\n\tstatus = \"okay\";\n}};\n")
}

/// Node a `chosen` property points at, e.g. `usart1` for
/// `zephyr,console = &usart1;`.
pub fn find_chosen(name: &str, dts: &str) -> Result<Option<String>, TemplateError> {
    let re = Regex::new(&format!(r"{}\s*=\s*&([^;\s]+)\s*;", regex::escape(name)))?;
    Ok(re
        .captures(dts)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// `chosen` block exporting the shell UART, falling back to the console.
///
/// Empty when `dts` names neither.
pub fn chosen_block(dts: &str) -> Result<String, TemplateError> {
    let shell = match find_chosen("zephyr,shell-uart", dts)? {
        Some(uart) => Some(uart),
        None => find_chosen("zephyr,console", dts)?,
    };
    Ok(shell
        .map(|uart| format!("/ {{\n\tchosen {{\n\t\tzephyr,shell-uart = &{uart};\n\t}};\n}};\n"))
        .unwrap_or_default())
}
