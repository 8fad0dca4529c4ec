//! Artifact generation for validated design graphs.
//!
//! - [`generate_board`]: Zephyr board directory with the devicetree overlay for
//!   everything connected to the SoC.
//! - [`generate_app`]: application sources instantiated from a template.
//! - [`prepare_platform_files`]: simulator script and platform description for a
//!   finished build.
//!
//! Output never depends on anything but the inputs: no timestamps, ordered maps,
//! graph order preserved. Output directories are swapped in atomically.

pub mod app;
pub mod atomic;
pub mod board;
pub mod devicetree;
pub mod error;
pub mod labels;
pub mod platform;
pub mod template;

use std::path::PathBuf;

use vsd_graph::ValidatedGraph;

pub use app::{generate_app, AppArtifacts, TemplateSource};
pub use board::{BoardTarget, SocConfig};
pub use error::{GenerationError, Result, TemplateError};
pub use labels::{LabelMap, ListRule, TemplateConfig};
pub use platform::{prepare_platform_files, BuildArtifacts, DtsTranslator, PlatformFiles};
pub use template::{render, TemplateContext};

/// Everything produced for one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub board_name: String,
    pub board_dir: PathBuf,
    /// Present when a template was instantiated.
    pub app: Option<AppArtifacts>,
}

/// Generate the board directory for `target`, replacing any previous one.
pub fn generate_board(graph: &ValidatedGraph<'_>, target: &BoardTarget) -> Result<PathBuf> {
    // Fail before touching the filesystem.
    board::soc_name(graph)?;
    let dir = target.board_dir();
    atomic::replace_dir(&dir, true, |staging| board::write_board_files(graph, target, staging))?;
    Ok(dir)
}

/// Generate the board and, when a template is given, the application.
pub fn generate(
    graph: &ValidatedGraph<'_>,
    target: &BoardTarget,
    template: Option<&TemplateSource>,
) -> Result<ArtifactSet> {
    let board_dir = generate_board(graph, target)?;
    let app = template.map(|t| generate_app(graph, t)).transpose()?;
    Ok(ArtifactSet {
        board_name: target.board_name.clone(),
        board_dir,
        app,
    })
}
