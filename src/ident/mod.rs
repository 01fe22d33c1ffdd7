//! Identifier allocation
//!
//! Every object the host engine sees gets a short identifier minted here.
//! Identifiers are `{category}{n}`; categories are free-form strings
//! ("pi" for part instances, "par" for parameter groups, "csel" for
//! template-local selections and so on).

mod allocator;
mod shared;
mod snapshot;

pub use allocator::{CurrentSource, IdSource, IdentifierAllocator};
pub use shared::SharedAllocator;
pub use snapshot::SnapshotError;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentError {
    /// The pseudonym is already bound; `rejected` is the identifier the
    /// failed request consumed.
    #[error("pseudonym '{pseudonym}' is already bound to {existing} (request consumed {rejected})")]
    DuplicatePseudonym {
        pseudonym: String,
        existing: String,
        rejected: String,
    },

    /// An identifier offered for reuse was never handed out in its category
    #[error("{id} was never issued in category '{category}'")]
    NotIssued { category: String, id: String },

    #[error("pseudonym '{pseudonym}' is bound to {existing}, not {requested}")]
    PseudonymMismatch {
        pseudonym: String,
        existing: String,
        requested: String,
    },
}
