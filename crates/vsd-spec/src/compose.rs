//! Catalog composition: ordered modifications over a base catalog, then a flat
//! snapshot with every `extends` chain resolved.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::error::{Result, SpecCompositionError};
use crate::modification::SpecModification;
use crate::node::NodeTypeSpec;

/// The immutable catalog a compilation request validates and generates against.
///
/// Holds both the composed catalog (as it would be written back to disk) and the
/// flattened node type table with inheritance applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveCatalog {
    composed: Catalog,
    resolved: BTreeMap<String, NodeTypeSpec>,
}

impl EffectiveCatalog {
    /// Look up a resolved node type.
    pub fn get(&self, name: &str) -> Option<&NodeTypeSpec> {
        self.resolved.get(name)
    }

    /// All resolved node types, ordered by name.
    pub fn node_types(&self) -> impl Iterator<Item = &NodeTypeSpec> {
        self.resolved.values()
    }

    /// Names of instantiable board root types.
    pub fn board_roots(&self) -> impl Iterator<Item = &str> {
        self.resolved
            .values()
            .filter(|n| !n.is_abstract && n.is_board_root())
            .map(|n| n.name.as_str())
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.composed.metadata
    }

    /// The composed catalog before inheritance was flattened.
    pub fn composed(&self) -> &Catalog {
        &self.composed
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Apply `modifications` in order to `base` and flatten the result.
///
/// Fails fast: the first error aborts composition and no catalog is returned.
pub fn compose(base: &Catalog, modifications: &[SpecModification]) -> Result<EffectiveCatalog> {
    base.check()?;
    let mut composed = base.clone();
    for (index, modification) in modifications.iter().enumerate() {
        apply(&mut composed, modification, index)?;
    }
    let resolved = flatten(&composed)?;
    tracing::debug!(
        node_types = resolved.len(),
        modifications = modifications.len(),
        "catalog composed"
    );
    Ok(EffectiveCatalog { composed, resolved })
}

/// Load the base catalog and modification files, then compose them in the given order.
pub fn compose_files(base: &Path, modifications: &[impl AsRef<Path>]) -> Result<EffectiveCatalog> {
    let catalog = Catalog::load(base)?;
    let mods = modifications
        .iter()
        .map(|p| SpecModification::load(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    compose(&catalog, &mods)
}

fn apply(catalog: &mut Catalog, modification: &SpecModification, index: usize) -> Result<()> {
    for (key, value) in &modification.metadata {
        catalog.metadata.insert(key.clone(), value.clone());
    }

    for node in &modification.add_nodes {
        match catalog.node(&node.name) {
            Some(existing) if existing.subsumes(node) => {
                tracing::debug!(node = %node.name, "node type already present, skipping");
            }
            Some(_) => {
                return Err(SpecCompositionError::DuplicateNodeType {
                    name: node.name.clone(),
                })
            }
            None => catalog.nodes.push(node.clone()),
        }
    }

    for entry in &modification.mods {
        // All targets are checked before any of them is touched.
        if let Some(missing) = entry.names.iter().find(|name| !catalog.contains(name)) {
            return Err(SpecCompositionError::UnknownNodeTypeReferenced {
                name: missing.clone(),
                modification: index,
            });
        }
        for name in &entry.names {
            let Some(node) = catalog.node_mut(name) else {
                continue;
            };
            for property in &entry.add_properties {
                node.merge_property(property);
            }
            for interface in &entry.add_interface {
                node.merge_interface(interface);
            }
        }
    }
    Ok(())
}

fn flatten(catalog: &Catalog) -> Result<BTreeMap<String, NodeTypeSpec>> {
    let mut resolved = BTreeMap::new();
    for node in &catalog.nodes {
        let mut chain = Vec::new();
        resolve(catalog, &node.name, &mut resolved, &mut chain)?;
    }
    Ok(resolved)
}

fn resolve(
    catalog: &Catalog,
    name: &str,
    resolved: &mut BTreeMap<String, NodeTypeSpec>,
    chain: &mut Vec<String>,
) -> Result<Option<NodeTypeSpec>> {
    if let Some(done) = resolved.get(name) {
        return Ok(Some(done.clone()));
    }
    if chain.iter().any(|n| n == name) {
        chain.push(name.to_string());
        return Err(SpecCompositionError::CyclicExtends {
            chain: chain.join(" -> "),
        });
    }
    let Some(own) = catalog.node(name) else {
        return Ok(None);
    };

    chain.push(name.to_string());
    let mut node = own.clone();
    for parent_name in &own.extends {
        let Some(parent) = resolve(catalog, parent_name, resolved, chain)? else {
            tracing::warn!(node = %name, extends = %parent_name, "extended node type not found");
            continue;
        };
        inherit(&mut node, &parent);
    }
    chain.pop();

    resolved.insert(name.to_string(), node.clone());
    Ok(Some(node))
}

/// Own members win; inherited ones fill the gaps.
fn inherit(node: &mut NodeTypeSpec, parent: &NodeTypeSpec) {
    for property in &parent.properties {
        node.merge_property(property);
    }
    for interface in &parent.interfaces {
        node.merge_interface(interface);
    }
    if node.category.is_none() {
        node.category = parent.category.clone();
    }
    for (key, url) in &parent.urls {
        node.urls.entry(key.clone()).or_insert_with(|| url.clone());
    }
    if node.additional_data.is_none() {
        node.additional_data = parent.additional_data.clone();
    }
}
