//! Specification composition errors.

use std::path::PathBuf;

/// Errors that abort catalog composition.
///
/// Composition is fail-fast: any of these means no catalog is produced.
#[derive(Debug, thiserror::Error)]
pub enum SpecCompositionError {
    /// A node type with this name already exists and the new one is not identical.
    #[error("duplicate node type: {name}")]
    DuplicateNodeType { name: String },

    /// A modification names a node type that is absent from the catalog composed so far.
    #[error("modification #{modification} references unknown node type '{name}'")]
    UnknownNodeTypeReferenced { name: String, modification: usize },

    /// A modification file violates the modification schema.
    #[error("malformed modification {origin}: {detail}")]
    MalformedModification { origin: String, detail: String },

    /// The base catalog itself is not well formed.
    #[error("malformed catalog: {detail}")]
    MalformedCatalog { detail: String },

    /// `extends` chains loop back on themselves.
    #[error("cyclic extends chain: {chain}")]
    CyclicExtends { chain: String },

    /// Reading a catalog or modification file failed.
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias for specification operations.
pub type Result<T> = std::result::Result<T, SpecCompositionError>;
