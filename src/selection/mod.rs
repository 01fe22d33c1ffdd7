//! Selection registry
//!
//! A selection is a named set of geometric entities that grows as
//! construction steps contribute to it. Selections of a part instance live
//! in a namespaced registry so that two instances of the same template
//! never collide.

mod entity;
mod registry;

pub use entity::{EntityKind, EntityRef};
pub use registry::{Contribution, Members, Selection, SelectionOp, SelectionRegistry};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("duplicate selection name: {selection}")]
    DuplicateSelectionName { selection: String },

    #[error("selection {selection} was declared but never materialized")]
    SelectionNeverMaterialized { selection: String },

    #[error("unknown selection: {selection}")]
    UnknownSelection { selection: String },
}
