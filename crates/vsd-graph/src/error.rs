use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use vsd_spec::Direction;

/// Errors raised while reading a graph file.
#[derive(Debug, Error)]
pub enum GraphFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed graph file: {0}")]
    Malformed(String),

    #[error("graph file contains no graph")]
    Empty,
}

/// One rule violation found while validating a graph against the catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("node '{label}': unknown node type '{type_name}'")]
    UnknownNodeType { label: String, type_name: String },

    #[error("node '{label}': property '{property}' expects {expected}, found {found}")]
    TypeMismatch {
        label: String,
        property: String,
        expected: String,
        found: String,
    },

    #[error("node '{label}': property '{property}' is not declared by its type")]
    UnknownProperty { label: String, property: String },

    #[error("connection {connection}: node '{label}' has no interface '{interface}'")]
    UnknownInterface {
        connection: usize,
        label: String,
        interface: String,
    },

    #[error("connection {connection} ({from} -> {to}): incompatible interface types {from_types} and {to_types}")]
    IncompatibleInterfaceTypes {
        connection: usize,
        from: String,
        to: String,
        from_types: String,
        to_types: String,
    },

    #[error("connection {connection} ({from} -> {to}): cannot connect {from_direction} to {to_direction}")]
    DirectionConflict {
        connection: usize,
        from: String,
        to: String,
        from_direction: Direction,
        to_direction: Direction,
    },

    #[error("interface '{label}.{interface}' has {count} connection(s), limit is {limit}")]
    ConnectionLimitExceeded {
        label: String,
        interface: String,
        limit: usize,
        count: usize,
    },

    #[error("label '{label}' is used by {count} nodes")]
    DuplicateLabel { label: String, count: usize },

    #[error("graph has more than one board root: {}", labels.join(", "))]
    MultipleBoardRoots { labels: Vec<String> },

    #[error("connection {connection}: interface id '{interface_id}' does not exist")]
    DanglingConnection {
        connection: usize,
        interface_id: String,
    },
}

/// Every issue found in one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph validation failed with {} issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

pub type Result<T> = std::result::Result<T, GraphFileError>;
