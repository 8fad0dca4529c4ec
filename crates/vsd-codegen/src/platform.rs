//! Simulator platform description: the `.resc` script and the `.repl`
//! platform produced by the devicetree translator.

use std::fs;
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::devicetree::find_chosen;
use crate::error::{GenerationError, Result};
use crate::template::{render, TemplateContext};

/// Script template file name looked up in a templates directory.
pub const RESC_TEMPLATE: &str = "run.resc";

/// Script used when no templates directory is given.
pub const DEFAULT_RESC: &str = r#":name: {{ board_name }}
:description: Simulation of the {{ board_name }} board

using sysbus
$name?="{{ board_name }}"
mach create $name

machine LoadPlatformDescription @{{ repl_path }}
$bin?=@{{ elf_path }}

//! for console in consoles
showAnalyzer {{ console }}
//! endfor

macro reset
"""
    sysbus LoadELF $bin
"""
runMacro $reset
"#;

/// Converts a built devicetree into a platform description.
pub trait DtsTranslator {
    /// Platform description text for the devicetree at `dts`.
    fn translate(&self, dts: &Path) -> Result<String>;
}

impl<F> DtsTranslator for F
where
    F: Fn(&Path) -> Result<String>,
{
    fn translate(&self, dts: &Path) -> Result<String> {
        self(dts)
    }
}

/// Paths of the generated simulator files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFiles {
    pub resc: PathBuf,
    pub repl: PathBuf,
}

/// Build artifacts a platform description is generated from.
#[derive(Debug, Clone)]
pub struct BuildArtifacts {
    pub dts: PathBuf,
    pub elf: PathBuf,
}

impl BuildArtifacts {
    /// Standard locations under `builds/<board>/`.
    pub fn in_dir(builds_dir: &Path) -> Self {
        let zephyr = builds_dir.join("zephyr");
        Self {
            dts: zephyr.join("zephyr.dts"),
            elf: zephyr.join("zephyr.elf"),
        }
    }
}

/// The `.resc` template text: `<templates_dir>/run.resc`, or the built-in one.
pub fn resc_template(templates_dir: Option<&Path>) -> Result<String> {
    match templates_dir {
        Some(dir) => {
            let path = dir.join(RESC_TEMPLATE);
            fs::read_to_string(&path).map_err(GenerationError::io(&path))
        }
        None => Ok(DEFAULT_RESC.to_string()),
    }
}

/// Write `<board>.resc` and `<board>.repl` into `builds_dir`.
///
/// The translator output must be non-empty; there is no retry.
pub fn prepare_platform_files(
    board: &str,
    builds_dir: &Path,
    templates_dir: Option<&Path>,
    translator: &dyn DtsTranslator,
) -> Result<PlatformFiles> {
    let builds_dir = fs::canonicalize(builds_dir).map_err(GenerationError::io(builds_dir))?;
    let artifacts = BuildArtifacts::in_dir(&builds_dir);
    if !artifacts.dts.is_file() {
        return Err(GenerationError::PlatformDescription(format!(
            "devicetree {} not found",
            artifacts.dts.display()
        )));
    }
    let files = PlatformFiles {
        resc: builds_dir.join(format!("{board}.resc")),
        repl: builds_dir.join(format!("{board}.repl")),
    };

    let dts = fs::read_to_string(&artifacts.dts).map_err(GenerationError::io(&artifacts.dts))?;
    let console = find_chosen("zephyr,console", &dts).map_err(|source| GenerationError::Template {
        path: artifacts.dts.clone(),
        source,
    })?;

    let mut ctx = TemplateContext::new()
        .with_var("board_name", board)
        .with_var("resc_path", files.resc.display().to_string())
        .with_var("repl_path", files.repl.display().to_string())
        .with_var("elf_path", artifacts.elf.display().to_string())
        .with_list("consoles", console.iter().cloned().collect());
    if let Some(console) = &console {
        ctx.set_var("console", console.as_str());
    }

    let template_path = templates_dir
        .map(|d| d.join(RESC_TEMPLATE))
        .unwrap_or_else(|| PathBuf::from(RESC_TEMPLATE));
    let resc = render(&resc_template(templates_dir)?, &ctx).map_err(|source| GenerationError::Template {
        path: template_path,
        source,
    })?;

    let repl = translator.translate(&artifacts.dts)?;
    if repl.trim().is_empty() {
        return Err(GenerationError::PlatformDescription(
            "translator produced an empty platform description".into(),
        ));
    }
    // The script points at the platform file; both land together or not at all.
    atomic::write_files(&[
        (files.resc.as_path(), resc.as_str()),
        (files.repl.as_path(), repl.as_str()),
    ])?;

    tracing::info!(board, dir = %builds_dir.display(), "simulator files ready");
    Ok(files)
}
