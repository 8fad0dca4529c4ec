//! Component specification registry for the Visual System Designer.
//!
//! Loads the base hardware-component catalog and applies ordered specification
//! modifications to it, producing one immutable [`EffectiveCatalog`].
//!
//! # Composition rules
//!
//! - Metadata keys from a modification overwrite catalog metadata.
//! - `add_nodes` inserts whole node types; a clashing name is an error unless the
//!   existing entry already contains the added one unchanged.
//! - `mods` append properties and interfaces to named node types, skipping names
//!   that already exist, so applying a modification twice changes nothing.
//! - `extends` chains are flattened once, after all modifications.

pub mod catalog;
pub mod compose;
pub mod error;
pub mod modification;
pub mod node;

pub use catalog::Catalog;
pub use compose::{compose, compose_files, EffectiveCatalog};
pub use error::{Result, SpecCompositionError};
pub use modification::{ModEntry, SpecModification};
pub use node::{Direction, InterfaceSpec, NodeTypeSpec, PropertySpec, PropertyType, TypeTags};
