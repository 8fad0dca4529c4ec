use std::path::PathBuf;

use thiserror::Error;

/// Errors from the template language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("line {line}: unknown list '{list}'")]
    UnknownList { list: String, line: usize },

    #[error("line {line}: unknown variable '{name}'")]
    UnknownVariable { name: String, line: usize },

    #[error("line {line}: cannot evaluate expression '{expr}'")]
    InvalidExpression { expr: String, line: usize },

    #[error("line {line}: invalid directive '//! {directive}'")]
    InvalidDirective { directive: String, line: usize },

    #[error("line {line}: loop is never closed")]
    UnclosedLoop { line: usize },

    #[error("line {line}: 'endfor' without a matching 'for'")]
    UnexpectedEndfor { line: usize },

    #[error("invalid pattern: {0}")]
    Pattern(String),
}

impl From<regex::Error> for TemplateError {
    fn from(e: regex::Error) -> Self {
        TemplateError::Pattern(e.to_string())
    }
}

/// Errors raised while generating artifacts.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("graph has no board root (SoC) node")]
    MissingBoardRoot,

    #[error("no resources for SoC '{soc}' in {path}")]
    MissingSocResources { soc: String, path: PathBuf },

    #[error("invalid SoC configuration {path}: {detail}")]
    InvalidSocConfig { path: PathBuf, detail: String },

    #[error("invalid template configuration {path}: {detail}")]
    InvalidTemplateConfig { path: PathBuf, detail: String },

    #[error("template {path}: {source}")]
    Template {
        path: PathBuf,
        source: TemplateError,
    },

    #[error("output directory {path} already exists (use force to replace it)")]
    OutputExists { path: PathBuf },

    #[error("template directory {path} does not exist")]
    MissingTemplate { path: PathBuf },

    #[error("platform description: {0}")]
    PlatformDescription(String),
}

impl GenerationError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| GenerationError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
