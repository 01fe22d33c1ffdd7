//! Instance binder
//!
//! Turns a template plus a set of parameter bindings into a [`PartInstance`]:
//! the bindings are checked against the template's parameter contract and
//! evaluated, an instance identifier is allocated, every declared selection
//! is created in a registry namespaced by that identifier, and the
//! construction steps are replayed through a [`GeometryKernel`].
//!
//! [`GeometryKernel`]: crate::kernel::GeometryKernel

mod bind;
mod executor;
mod instance;
mod request;

pub use bind::InstanceBinder;
pub use instance::{Arm, BranchChoice, NamespacedSelection, PartInstance};
pub use request::InstanceRequest;

use thiserror::Error;

use crate::expr::ExprError;
use crate::ident::IdentError;
use crate::kernel::KernelError;
use crate::selection::SelectionError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Bindings do not cover exactly the declared parameters
    #[error("bindings for {template} do not match its parameters (missing: [{}], extra: [{}])", missing.join(", "), extra.join(", "))]
    ParameterMismatch {
        template: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("cannot bind {param} of {template}: {source}")]
    Binding {
        template: String,
        param: String,
        #[source]
        source: ExprError,
    },

    #[error("cannot allocate identifier for {template}: {source}")]
    Allocation {
        template: String,
        #[source]
        source: IdentError,
    },

    #[error("instance {instance} of {template}: {source}")]
    Selection {
        template: String,
        instance: String,
        #[source]
        source: SelectionError,
    },

    /// No predicate held and the conditional has no `else` arm
    #[error("no branch of conditional {feature} in instance {instance} of {template} applies")]
    NonExhaustiveConditional {
        template: String,
        instance: String,
        feature: String,
    },

    #[error("cannot evaluate predicate of {feature} in instance {instance} of {template}: {source}")]
    Predicate {
        template: String,
        instance: String,
        feature: String,
        #[source]
        source: ExprError,
    },

    #[error("instance {instance} of {template}: {source}")]
    Kernel {
        template: String,
        instance: String,
        #[source]
        source: KernelError,
    },

    #[error("keep flag for unknown selection {label} of {template}")]
    UnknownKeepFlag { template: String, label: String },
}
