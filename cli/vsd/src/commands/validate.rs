//! `vsd validate`: report every problem in a graph.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::Design;
use crate::config::VsdConfig;

pub fn run(config: &VsdConfig, graph: &Path, spec_mods: &[PathBuf]) -> Result<()> {
    let design = Design::load(config, graph, spec_mods)?;
    let validated = design.validate()?;

    println!("{}: valid", graph.display());
    println!("  Nodes:       {}", design.graph.node_count());
    println!("  Connections: {}", design.graph.connection_count());
    match validated.board_root() {
        Some(root) => println!("  Board root:  {} ({})", root.label(), root.type_name()),
        None => println!("  Board root:  none (board generation unavailable)"),
    }
    println!("  Board name:  {}", validated.board_name());
    Ok(())
}
