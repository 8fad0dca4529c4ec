//! Design graph model and validation.
//!
//! A graph file from the diagram editor is parsed into a [`GraphDocument`],
//! turned into an index-based [`GraphInstance`], and checked against an
//! [`vsd_spec::EffectiveCatalog`] by [`validate`], which reports every
//! problem at once.

pub mod document;
pub mod error;
pub mod instance;
pub mod validate;

pub use document::GraphDocument;
pub use error::{GraphFileError, Result, ValidationError, ValidationIssue};
pub use instance::{
    board_name_from, category_label, sanitize_label, Connection, Endpoint, GraphInstance, NodeInstance,
    UNTITLED_BOARD,
};
pub use validate::{parse_hex, validate, NodeView, RootLink, ValidatedGraph};
