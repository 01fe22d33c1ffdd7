//! Opaque references to host-engine geometry

use std::fmt;

/// Topological dimension of a geometric entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Domain,
    Boundary,
    Edge,
    Point,
}

impl EntityKind {
    /// Suffix the host engine appends to a selection tag for this level
    /// ("dom", "bnd", "edg", "pnt")
    pub fn suffix(self) -> &'static str {
        match self {
            EntityKind::Domain => "dom",
            EntityKind::Boundary => "bnd",
            EntityKind::Edge => "edg",
            EntityKind::Point => "pnt",
        }
    }
}

/// A geometric entity produced by the host engine.
///
/// The id is opaque to this crate; only equality matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn domain(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Domain, id)
    }

    pub fn boundary(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Boundary, id)
    }

    pub fn point(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Point, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.kind.suffix())
    }
}
