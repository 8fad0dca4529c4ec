//! Application sources generated from a template directory.

use std::fs;
use std::path::{Path, PathBuf};

use vsd_graph::ValidatedGraph;

use crate::atomic::{copy_tree, replace_dir};
use crate::error::{GenerationError, Result};
use crate::labels::{LabelMap, TemplateConfig, TEMPLATE_CONFIG};
use crate::template::{has_markers, render, TemplateContext};

/// A template to instantiate and where to put the result.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Replace `output_dir` if it already exists.
    pub force: bool,
}

/// Result of instantiating a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppArtifacts {
    pub dir: PathBuf,
    pub labels: LabelMap,
    /// Files that were rendered, relative to `dir`, sorted.
    pub rendered: Vec<PathBuf>,
}

/// Copy the template, render every file that uses template syntax, and swap
/// the result into `output_dir`.
pub fn generate_app(graph: &ValidatedGraph<'_>, source: &TemplateSource) -> Result<AppArtifacts> {
    if !source.template_dir.is_dir() {
        return Err(GenerationError::MissingTemplate {
            path: source.template_dir.clone(),
        });
    }
    let config = TemplateConfig::load(&source.template_dir)?;
    let labels = LabelMap::from_graph(graph, &config.rules());
    let mut ctx = TemplateContext::from(labels.lists().clone());
    ctx.set_var("board_name", graph.board_name());

    let mut rendered = Vec::new();
    replace_dir(&source.output_dir, source.force, |staging| {
        copy_tree(&source.template_dir, staging)?;
        let config_copy = staging.join(TEMPLATE_CONFIG);
        if config_copy.exists() {
            fs::remove_file(&config_copy).map_err(GenerationError::io(&config_copy))?;
        }
        render_tree(staging, staging, &source.template_dir, &ctx, &mut rendered)
    })?;
    rendered.sort();

    tracing::info!(
        output = %source.output_dir.display(),
        rendered = rendered.len(),
        "application generated"
    );
    Ok(AppArtifacts {
        dir: source.output_dir.clone(),
        labels,
        rendered,
    })
}

fn render_tree(
    root: &Path,
    dir: &Path,
    template_dir: &Path,
    ctx: &TemplateContext,
    rendered: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(GenerationError::io(dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(GenerationError::io(dir))?;
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            render_tree(root, &path, template_dir, ctx, rendered)?;
            continue;
        }
        let bytes = fs::read(&path).map_err(GenerationError::io(&path))?;
        // Binary and non-UTF-8 files are copied as they are.
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        if !has_markers(&text) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let output = render(&text, ctx).map_err(|source| GenerationError::Template {
            path: template_dir.join(&relative),
            source,
        })?;
        fs::write(&path, output).map_err(GenerationError::io(&path))?;
        rendered.push(relative);
    }
    Ok(())
}
