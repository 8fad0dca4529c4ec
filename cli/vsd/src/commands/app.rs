//! `vsd prepare-zephyr-app`: board, application and build in one go.

use std::path::{Path, PathBuf};

use anyhow::Result;
use vsd_codegen::TemplateSource;
use vsd_pipeline::{OutputMode, PipelineRequest, Stage};

use super::Design;
use crate::config::VsdConfig;

pub fn run(
    config: &VsdConfig,
    graph: &Path,
    source_dir: &Path,
    from_template: Option<&Path>,
    force: bool,
    spec_mods: &[PathBuf],
) -> Result<()> {
    let design = Design::load(config, graph, spec_mods)?;
    let validated = design.validate()?;
    let board = validated.board_name();

    let mut request = PipelineRequest::new(&board, Stage::PrepareBoard, Stage::Build)
        .with_graph(&validated)
        .with_app(source_dir);
    if let Some(template) = from_template {
        request = request.with_template(TemplateSource {
            template_dir: template.to_path_buf(),
            output_dir: source_dir.to_path_buf(),
            force,
        });
    }

    let orchestrator = config.orchestrator(true, OutputMode::Log)?;
    let report = orchestrator.run(&request)?;
    print!("{report}");
    println!("Application for '{board}' built from {}", source_dir.display());
    Ok(())
}
