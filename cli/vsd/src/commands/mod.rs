//! CLI command implementations.

pub mod app;
pub mod board;
pub mod build;
pub mod clean;
pub mod editor;
pub mod info;
pub mod modify_spec;
pub mod renode;
pub mod simulate;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use vsd_graph::{GraphInstance, ValidatedGraph};
use vsd_spec::{compose_files, EffectiveCatalog};

use crate::config::VsdConfig;

/// A graph together with the catalog it is checked against.
pub struct Design {
    pub catalog: EffectiveCatalog,
    pub graph: GraphInstance,
}

impl Design {
    pub fn load(config: &VsdConfig, graph: &Path, spec_mods: &[PathBuf]) -> Result<Self> {
        let catalog_path = config.catalog_path();
        let catalog = compose_files(&catalog_path, spec_mods)
            .with_context(|| format!("failed to compose specification {}", catalog_path.display()))?;
        let graph = GraphInstance::load(graph).with_context(|| format!("failed to load graph {}", graph.display()))?;
        Ok(Self { catalog, graph })
    }

    pub fn validate(&self) -> Result<ValidatedGraph<'_>> {
        vsd_graph::validate(&self.graph, &self.catalog).context("graph does not match the specification")
    }
}
