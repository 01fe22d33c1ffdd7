//! A realized part instance

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::expr::{Expr, Value};
use crate::selection::{EntityRef, Members, SelectionError, SelectionRegistry};
use crate::template::Template;

/// Which arm of a conditional ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Branch(usize),
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChoice {
    /// Namespaced feature tag of the conditional
    pub feature: String,
    pub arm: Arm,
}

/// One of the instance's selections, as the host engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedSelection {
    pub label: String,
    /// Template-local id ("csel3")
    pub local_id: String,
    /// Global handle ("pi1_csel3")
    pub handle: String,
    pub keep: bool,
    pub materialized: bool,
}

/// The realized copy of a template.
///
/// Holds the evaluated parameters, the instance's selection registry and a
/// record of which construction steps actually executed.
#[derive(Debug, Clone)]
pub struct PartInstance {
    pub(super) instance_id: String,
    pub(super) pseudonym: Option<String>,
    pub(super) template: Arc<Template>,
    pub(super) bindings: IndexMap<String, Expr>,
    pub(super) values: IndexMap<String, Value>,
    pub(super) selections: Vec<NamespacedSelection>,
    pub(super) registry: SelectionRegistry,
    pub(super) prunable: IndexSet<EntityRef>,
    pub(super) executed: Vec<String>,
    pub(super) branches: Vec<BranchChoice>,
    pub(super) sources: Vec<String>,
}

impl PartInstance {
    /// Globally unique instance identifier ("pi1")
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn pseudonym(&self) -> Option<&str> {
        self.pseudonym.as_deref()
    }

    /// The template this instance was stamped from
    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// Bound parameter expressions, in template parameter order
    pub fn bindings(&self) -> &IndexMap<String, Expr> {
        &self.bindings
    }

    /// Evaluated parameter values
    pub fn value(&self, param: &str) -> Option<Value> {
        self.values.get(param).copied()
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn selections(&self) -> &[NamespacedSelection] {
        &self.selections
    }

    /// Find a selection by label or template-local id
    pub fn selection(&self, name: &str) -> Option<&NamespacedSelection> {
        self.selections
            .iter()
            .find(|s| s.label == name)
            .or_else(|| self.selections.iter().find(|s| s.local_id == name))
    }

    /// Global handle of a selection
    pub fn handle(&self, name: &str) -> Option<&str> {
        self.selection(name).map(|s| s.handle.as_str())
    }

    /// Members of a selection, by label or template-local id
    pub fn resolve(&self, name: &str) -> Result<&Members, SelectionError> {
        let selection = self
            .selection(name)
            .ok_or_else(|| SelectionError::UnknownSelection {
                selection: name.to_string(),
            })?;
        self.registry.resolve(&selection.local_id)
    }

    /// Members of a selection, by global handle
    pub fn resolve_handle(&self, handle: &str) -> Result<&Members, SelectionError> {
        self.registry.resolve_handle(handle)
    }

    pub fn registry(&self) -> &SelectionRegistry {
        &self.registry
    }

    /// Selections whose entities survive pruning
    pub fn kept(&self) -> impl Iterator<Item = &NamespacedSelection> {
        self.selections.iter().filter(|s| s.keep)
    }

    /// Entities produced by this instance that no kept selection retains
    pub fn prunable(&self) -> &IndexSet<EntityRef> {
        &self.prunable
    }

    /// Namespaced feature tags of the steps that ran, in order
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Arms chosen for each conditional that was reached
    pub fn branches(&self) -> &[BranchChoice] {
        &self.branches
    }

    /// Current source identifiers registered for this instance ("pcs1")
    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}
