//! Grouping of graph node labels into the named lists templates iterate over.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use vsd_graph::{NodeView, ValidatedGraph};

use crate::error::{GenerationError, Result};

/// Hardware models with a Zephyr thermometer driver.
pub const THERMOMETER_MODELS: [&str; 4] = [
    "bosch_bme280",
    "sensirion_sht4x",
    "silabs_si7210",
    "ti_tmp108",
];

/// List holding every label that matched some other list.
pub const ALL_LABELS: &str = "all_labels";

/// Name of the optional per-template configuration file.
pub const TEMPLATE_CONFIG: &str = "template.toml";

/// Which nodes belong to a list: any category prefix or any hardware model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListRule {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

impl ListRule {
    pub fn matches(&self, node: &NodeView<'_>) -> bool {
        self.categories.iter().any(|c| node.spec.in_category(c))
            || node
                .spec
                .model_name()
                .is_some_and(|m| self.models.iter().any(|model| model == m))
    }
}

/// `template.toml` in an application template directory.
///
/// ```toml
/// [lists.buttons]
/// categories = ["IO/Button"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    #[serde(default)]
    pub lists: BTreeMap<String, ListRule>,
}

impl TemplateConfig {
    /// Read `template.toml` from `template_dir`; absent file means no extra lists.
    pub fn load(template_dir: &Path) -> Result<Self> {
        let path = template_dir.join(TEMPLATE_CONFIG);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(GenerationError::io(&path))?;
        toml::from_str(&text).map_err(|e| GenerationError::InvalidTemplateConfig {
            path,
            detail: e.to_string(),
        })
    }

    /// Built-in rules overlaid with this configuration's lists.
    pub fn rules(&self) -> BTreeMap<String, ListRule> {
        let mut rules = builtin_rules();
        rules.extend(self.lists.clone());
        rules.remove(ALL_LABELS);
        rules
    }
}

/// `leds` and `thermometers`.
pub fn builtin_rules() -> BTreeMap<String, ListRule> {
    BTreeMap::from([
        (
            "leds".to_string(),
            ListRule {
                categories: vec!["IO/LED".into()],
                models: Vec::new(),
            },
        ),
        (
            "thermometers".to_string(),
            ListRule {
                categories: vec!["Sensors/Thermometer".into()],
                models: THERMOMETER_MODELS.iter().map(|m| m.to_string()).collect(),
            },
        ),
    ])
}

/// List name to node labels, each list in graph order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelMap {
    lists: BTreeMap<String, Vec<String>>,
}

impl LabelMap {
    /// Collect labels of the nodes wired to the board root, or of all nodes
    /// when the graph has no root. Only wired nodes get a devicetree label, so
    /// anything else would not resolve in the firmware build.
    ///
    /// Every rule yields a list, possibly empty, so templates may iterate lists
    /// the graph does not populate.
    pub fn from_graph(graph: &ValidatedGraph<'_>, rules: &BTreeMap<String, ListRule>) -> Self {
        let mut lists: BTreeMap<String, Vec<String>> =
            rules.keys().map(|name| (name.clone(), Vec::new())).collect();
        let wired: Option<BTreeSet<usize>> = graph
            .board_root()
            .map(|_| graph.root_neighbours().iter().map(|link| link.node.index).collect());
        let mut all = Vec::new();
        for node in graph.nodes() {
            if wired.as_ref().is_some_and(|w| !w.contains(&node.index)) {
                continue;
            }
            let mut matched = false;
            for (name, rule) in rules {
                if rule.matches(&node) {
                    matched = true;
                    if let Some(list) = lists.get_mut(name) {
                        list.push(node.label().to_string());
                    }
                }
            }
            if matched {
                all.push(node.label().to_string());
            }
        }
        lists.insert(ALL_LABELS.to_string(), all);
        Self { lists }
    }

    pub fn get(&self, name: &str) -> &[String] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lists(&self) -> &BTreeMap<String, Vec<String>> {
        &self.lists
    }

    pub fn into_lists(self) -> BTreeMap<String, Vec<String>> {
        self.lists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vsd_graph::{validate, GraphInstance};
    use vsd_spec::{compose, Catalog, NodeTypeSpec};

    fn catalog() -> vsd_spec::EffectiveCatalog {
        let mut bme = NodeTypeSpec::new("BME280", "Sensors/Environment");
        bme.urls.insert("rdp".into(), json!("https://designer.antmicro.com/hardware/devices/bosch_bme280"));
        let base = Catalog {
            nodes: vec![
                NodeTypeSpec::new("LED", "IO/LED"),
                NodeTypeSpec::new("TMP", "Sensors/Thermometer/TI"),
                NodeTypeSpec::new("Button", "IO/Button"),
                bme,
            ],
            ..Default::default()
        };
        compose(&base, &[]).unwrap()
    }

    #[test]
    fn builtin_lists_in_graph_order() {
        let catalog = catalog();
        let mut graph = GraphInstance::default();
        graph.add_node("TMP", "t0");
        graph.add_node("LED", "led1");
        graph.add_node("Button", "btn");
        graph.add_node("BME280", "env");
        graph.add_node("LED", "led0");
        let validated = validate(&graph, &catalog).unwrap();

        let labels = LabelMap::from_graph(&validated, &builtin_rules());
        assert_eq!(labels.get("leds"), ["led1", "led0"]);
        assert_eq!(labels.get("thermometers"), ["t0", "env"]);
        assert_eq!(labels.get(ALL_LABELS), ["t0", "led1", "env", "led0"]);
        assert!(labels.get("buttons").is_empty());
    }

    #[test]
    fn template_config_adds_lists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TEMPLATE_CONFIG),
            "[lists.buttons]\ncategories = [\"IO/Button\"]\n",
        )
        .unwrap();
        let config = TemplateConfig::load(dir.path()).unwrap();
        let rules = config.rules();
        assert!(rules.contains_key("leds"));

        let catalog = catalog();
        let mut graph = GraphInstance::default();
        graph.add_node("Button", "btn");
        let validated = validate(&graph, &catalog).unwrap();
        let labels = LabelMap::from_graph(&validated, &rules);
        assert_eq!(labels.get("buttons"), ["btn"]);
        assert_eq!(labels.get(ALL_LABELS), ["btn"]);
    }

    #[test]
    fn missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TemplateConfig::load(dir.path()).unwrap(), TemplateConfig::default());
    }

    #[test]
    fn bad_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPLATE_CONFIG), "[lists.x]\nkinds = []\n").unwrap();
        assert!(matches!(
            TemplateConfig::load(dir.path()),
            Err(GenerationError::InvalidTemplateConfig { .. })
        ));
    }
}
