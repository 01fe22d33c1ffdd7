//! Seam to the host geometry engine
//!
//! The binder never builds geometry itself. Each construction step becomes
//! a [`FeatureCall`] handed to a [`GeometryKernel`], which answers with the
//! entities it produced. [`SymbolicKernel`] is a deterministic stand-in that
//! mints opaque entity ids, used for dry runs and tests.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;

use crate::expr::Value;
use crate::selection::{EntityKind, EntityRef};
use crate::template::GeomValue;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("host engine rejected feature {feature}: {message}")]
    Rejected { feature: String, message: String },
}

/// What kind of feature the host should build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind<'a> {
    /// A named primitive shape or transform ("cylinder", "rotate", ...)
    Shape(&'a str),
    Union,
    Difference,
    Partition,
    Delete,
}

/// One feature in the host engine's feature tree
#[derive(Debug, Clone)]
pub struct FeatureCall<'a> {
    /// Globally unique feature tag, `{instance}_{local feature id}`
    pub feature_id: String,
    pub label: Option<&'a str>,
    pub kind: FeatureKind<'a>,
    /// Input selections: (handle, current members)
    pub inputs: Vec<(String, Vec<EntityRef>)>,
    /// Handle of the selection the result is contributed to
    pub target: Option<String>,
    pub geometry: &'a [(String, GeomValue)],
    /// Evaluated instance parameters
    pub params: &'a IndexMap<String, Value>,
}

pub trait GeometryKernel {
    /// Build a primitive; returns the entities it produced
    fn create(&mut self, call: &FeatureCall<'_>) -> Result<Vec<EntityRef>, KernelError>;

    /// Split `domain` entities along `tool`; returns (original, parts) for
    /// every entity that was actually split
    fn partition(
        &mut self,
        call: &FeatureCall<'_>,
        domain: &[EntityRef],
        tool: &[EntityRef],
    ) -> Result<Vec<(EntityRef, Vec<EntityRef>)>, KernelError>;

    /// Union or difference feature; membership bookkeeping happens in the binder
    fn boolean(&mut self, call: &FeatureCall<'_>) -> Result<(), KernelError> {
        let _ = call;
        Ok(())
    }

    /// Delete feature removing `removed`
    fn delete(&mut self, call: &FeatureCall<'_>, removed: &[EntityRef]) -> Result<(), KernelError> {
        let _ = (call, removed);
        Ok(())
    }
}

/// Shapes that pick existing entities instead of creating new ones
const SELECTION_SHAPES: &[&str] = &["ballselection", "boxselection"];

/// Deterministic in-memory kernel.
///
/// Every created feature yields one entity named after its feature tag;
/// points are point entities, work planes boundaries, everything else a
/// domain. Partition splits each domain entity in two. Selection shapes
/// pick the last entity of their first input.
#[derive(Debug, Clone, Default)]
pub struct SymbolicKernel {
    journal: Vec<String>,
}

impl SymbolicKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature tags in execution order
    pub fn journal(&self) -> &[String] {
        &self.journal
    }

    fn record(&mut self, call: &FeatureCall<'_>) {
        trace!(feature = %call.feature_id, kind = ?call.kind, "symbolic feature");
        self.journal.push(call.feature_id.clone());
    }
}

impl GeometryKernel for SymbolicKernel {
    fn create(&mut self, call: &FeatureCall<'_>) -> Result<Vec<EntityRef>, KernelError> {
        self.record(call);
        if call.target.is_none() {
            return Ok(Vec::new());
        }
        let shape = match call.kind {
            FeatureKind::Shape(shape) => shape.to_ascii_lowercase(),
            _ => String::new(),
        };
        if SELECTION_SHAPES.contains(&shape.as_str()) {
            let picked = call
                .inputs
                .first()
                .and_then(|(_, members)| members.last())
                .cloned();
            return Ok(picked.into_iter().collect());
        }
        let kind = match shape.as_str() {
            "point" => EntityKind::Point,
            "workplane" => EntityKind::Boundary,
            _ => EntityKind::Domain,
        };
        Ok(vec![EntityRef::new(kind, call.feature_id.clone())])
    }

    fn partition(
        &mut self,
        call: &FeatureCall<'_>,
        domain: &[EntityRef],
        tool: &[EntityRef],
    ) -> Result<Vec<(EntityRef, Vec<EntityRef>)>, KernelError> {
        self.record(call);
        if tool.is_empty() {
            return Ok(Vec::new());
        }
        Ok(domain
            .iter()
            .filter(|entity| entity.kind == EntityKind::Domain)
            .map(|entity| {
                let parts = (1..=2)
                    .map(|n| EntityRef::domain(format!("{}/{}:{n}", entity.id, call.feature_id)))
                    .collect();
                (entity.clone(), parts)
            })
            .collect())
    }

    fn boolean(&mut self, call: &FeatureCall<'_>) -> Result<(), KernelError> {
        self.record(call);
        Ok(())
    }

    fn delete(&mut self, call: &FeatureCall<'_>, _removed: &[EntityRef]) -> Result<(), KernelError> {
        self.record(call);
        Ok(())
    }
}
