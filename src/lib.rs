//! Cuff Assembly - identifiers, selections and part templates for nerve-cuff models
//!
//! This library is the bookkeeping layer behind parametric finite-element
//! models of implantable nerve-cuff electrodes. It allocates identifiers for
//! model objects, tracks named groups of geometric entities ("selections"),
//! and stamps out reusable parameterized part templates many times with
//! different bindings. Geometry itself is built by a host engine behind the
//! [`GeometryKernel`] trait.
//!
//! # Example
//!
//! ```rust
//! use cuff_assembly::{InstanceRequest, Session, TemplateRegistry};
//!
//! let mut registry = TemplateRegistry::new();
//! registry.load_str(r#"
//!     template Tube (R_in: 1 [mm], R_out: 2 [mm]) {
//!         selection INNER
//!         selection OUTER
//!         selection FINAL [keep]
//!         cylinder -> INNER [r: R_in]
//!         cylinder -> OUTER [r: R_out]
//!         difference OUTER - INNER -> FINAL
//!     }
//! "#, "example").unwrap();
//!
//! let mut session = Session::new(registry);
//! let request = InstanceRequest::new("Tube")
//!     .bind("R_in", "150 [um]")
//!     .bind("R_out", "0.5 [mm]");
//! let instance = session.instantiate(&request).unwrap();
//! assert_eq!(instance.handle("FINAL"), Some("pi1_csel3"));
//! ```

pub mod binder;
pub mod config;
pub mod design;
pub mod error;
pub mod expr;
pub mod ident;
pub mod kernel;
pub mod logging;
pub mod parser;
pub mod selection;
pub mod session;
pub mod template;

pub use binder::{BindError, InstanceBinder, InstanceRequest, PartInstance};
pub use config::AssemblyConfig;
pub use design::{Design, DesignError, DesignFile, DesignTable};
pub use error::ParseError;
pub use expr::{Expr, ExprError, Value};
pub use ident::{IdentError, IdentifierAllocator, SharedAllocator, SnapshotError};
pub use kernel::{GeometryKernel, SymbolicKernel};
pub use selection::{EntityRef, SelectionError, SelectionRegistry};
pub use session::{DriverReport, Session};
pub use template::{Template, TemplateError, TemplateRegistry};

use thiserror::Error;

/// Errors surfaced by a build session
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Ident(#[from] IdentError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Design(#[from] DesignError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("unknown design: {name}")]
    UnknownDesign { name: String },
}
