//! Part templates
//!
//! A template is a parameterized recipe for one cuff component: declared
//! parameters with default expressions, declared selections, and an ordered
//! tree of construction steps. Templates are written in a small text
//! format and registered once; the instance binder stamps out copies.
//!
//! # Example
//!
//! ```text
//! template TubeCuff (Theta: 340 [deg], R_in: 1 [mm], R_out: 2 [mm], L: 5 [mm]) {
//!     selection INNER
//!     selection OUTER
//!     selection CUFF_FINAL [keep]
//!
//!     cylinder "Make Inner Cuff Surface" -> INNER [r: R_in, h: L]
//!     cylinder "Make Outer Cuff Surface" -> OUTER [r: R_out, h: L]
//!     if Theta == 360 {
//!         difference OUTER - INNER -> CUFF_FINAL
//!     } elif Theta < 360 {
//!         difference "Cut" OUTER - INNER -> CUFF_FINAL
//!         rotate CUFF_FINAL [rot: 10 [deg]]
//!     }
//! }
//! ```

mod lower;
mod registry;
mod step;
mod validate;

pub use registry::{
    ParamDecl, SelectionSpec, Template, TemplateError, TemplateRegistry, SELECTION_CATEGORY,
};
pub use step::{
    BooleanKind, BooleanStep, Branch, Conditional, ConstructionStep, DeleteStep, GeomValue,
    PrimitiveStep,
};
