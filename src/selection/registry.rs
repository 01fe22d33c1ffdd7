//! Named, accumulating sets of geometric entities

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::{EntityRef, SelectionError};

/// Member set of a selection, in insertion order
pub type Members = IndexSet<EntityRef>;

/// Kind of construction operation that contributed to a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOp {
    Primitive,
    Union,
    Difference,
    Partition,
}

/// One contribution to a selection.
///
/// Boolean contributions name other selections in the same registry; they
/// are resolved when the contribution is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// Entities freshly produced by a primitive
    Entities(Vec<EntityRef>),
    /// Union of the named selections
    Union(Vec<String>),
    /// Members of `primary` not present in `subtract`
    Difference { primary: String, subtract: String },
    /// Members of `domain` after the host split some of them.
    ///
    /// Each `(original, parts)` pair replaces `original` with `parts` in
    /// every selection of the registry.
    Partition {
        domain: String,
        splits: Vec<(EntityRef, Vec<EntityRef>)>,
    },
}

impl Contribution {
    pub fn op(&self) -> SelectionOp {
        match self {
            Contribution::Entities(_) => SelectionOp::Primitive,
            Contribution::Union(_) => SelectionOp::Union,
            Contribution::Difference { .. } => SelectionOp::Difference,
            Contribution::Partition { .. } => SelectionOp::Partition,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    name: String,
    label: Option<String>,
    members: Members,
    source_op: Option<SelectionOp>,
    materialized: bool,
}

impl Selection {
    fn new(name: String, label: Option<String>) -> Self {
        Self {
            name,
            label,
            members: Members::new(),
            source_op: None,
            materialized: false,
        }
    }

    /// Registry key (namespaced when the registry has a prefix)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn members(&self) -> &Members {
        &self.members
    }

    /// Operation of the first contribution
    pub fn source_op(&self) -> Option<SelectionOp> {
        self.source_op
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }
}

/// Selection registry with optional namespacing.
///
/// With a prefix `p`, the selection created as `name` is stored under the
/// handle `p_name`. Local names and handles are both accepted by lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionRegistry {
    prefix: Option<String>,
    selections: IndexMap<String, Selection>,
}

impl SelectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespaced(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            selections: IndexMap::new(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Globally unique handle for a local selection name
    pub fn handle(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        }
    }

    pub fn create_selection(&mut self, name: &str) -> Result<&Selection, SelectionError> {
        self.insert(name, None)
    }

    /// Create a selection carrying a display label
    pub fn create_labelled(&mut self, name: &str, label: &str) -> Result<&Selection, SelectionError> {
        self.insert(name, Some(label.to_string()))
    }

    fn insert(&mut self, name: &str, label: Option<String>) -> Result<&Selection, SelectionError> {
        let key = self.handle(name);
        if self.selections.contains_key(&key) {
            return Err(SelectionError::DuplicateSelectionName { selection: key });
        }
        let index = self
            .selections
            .insert_full(key.clone(), Selection::new(key, label))
            .0;
        Ok(&self.selections[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Selection> {
        self.key(name).and_then(|key| self.selections.get(&key))
    }

    /// Accept both a local name and an already namespaced handle
    fn key(&self, name: &str) -> Option<String> {
        let handle = self.handle(name);
        if self.selections.contains_key(&handle) {
            Some(handle)
        } else if self.selections.contains_key(name) {
            Some(name.to_string())
        } else {
            None
        }
    }

    /// Apply a contribution to selection `name`, returning its new members
    pub fn contribute(
        &mut self,
        name: &str,
        contribution: Contribution,
    ) -> Result<&Members, SelectionError> {
        let key = self.key(name).ok_or_else(|| SelectionError::UnknownSelection {
            selection: self.handle(name),
        })?;
        let op = contribution.op();
        // `A - B -> A` narrows A in place instead of re-adding a subset
        let narrows = matches!(
            &contribution,
            Contribution::Difference { primary, .. } if self.key(primary).as_ref() == Some(&key)
        );

        let incoming: Vec<EntityRef> = match contribution {
            Contribution::Entities(entities) => entities,
            Contribution::Union(inputs) => {
                let mut merged = Vec::new();
                for input in &inputs {
                    merged.extend(self.resolve(input)?.iter().cloned());
                }
                merged
            }
            Contribution::Difference { primary, subtract } => {
                let removed = self.resolve(&subtract)?;
                self.resolve(&primary)?
                    .iter()
                    .filter(|entity| !removed.contains(*entity))
                    .cloned()
                    .collect()
            }
            Contribution::Partition { domain, splits } => {
                let before = self.resolve(&domain)?.clone();
                let parts: HashMap<&EntityRef, &Vec<EntityRef>> =
                    splits.iter().map(|(original, parts)| (original, parts)).collect();
                let mut result = Vec::new();
                for entity in &before {
                    match parts.get(entity) {
                        Some(pieces) => result.extend(pieces.iter().cloned()),
                        None => result.push(entity.clone()),
                    }
                }
                self.replace_split(&splits);
                result
            }
        };

        let selection = self
            .selections
            .get_mut(&key)
            .ok_or(SelectionError::UnknownSelection { selection: key })?;
        selection.materialized = true;
        selection.source_op.get_or_insert(op);
        if narrows {
            selection.members.retain(|entity| incoming.contains(entity));
        } else {
            selection.members.extend(incoming);
        }
        trace!(selection = %selection.name, ?op, members = selection.members.len(), "contributed");
        Ok(&selection.members)
    }

    /// Substitute split entities by their parts in every selection,
    /// preserving each selection's order
    fn replace_split(&mut self, splits: &[(EntityRef, Vec<EntityRef>)]) {
        for selection in self.selections.values_mut() {
            if !splits
                .iter()
                .any(|(original, _)| selection.members.contains(original))
            {
                continue;
            }
            let mut replaced = Members::with_capacity(selection.members.len());
            for entity in selection.members.drain(..) {
                match splits.iter().find(|(original, _)| *original == entity) {
                    Some((_, parts)) => replaced.extend(parts.iter().cloned()),
                    None => {
                        replaced.insert(entity);
                    }
                }
            }
            selection.members = replaced;
        }
    }

    /// Current members of a materialized selection
    pub fn resolve(&self, name: &str) -> Result<&Members, SelectionError> {
        let selection = self.get(name).ok_or_else(|| SelectionError::UnknownSelection {
            selection: self.handle(name),
        })?;
        if !selection.materialized {
            return Err(SelectionError::SelectionNeverMaterialized {
                selection: selection.name.clone(),
            });
        }
        Ok(&selection.members)
    }

    /// Resolve by global handle only
    pub fn resolve_handle(&self, handle: &str) -> Result<&Members, SelectionError> {
        match self.selections.get(handle) {
            None => Err(SelectionError::UnknownSelection {
                selection: handle.to_string(),
            }),
            Some(selection) if !selection.materialized => {
                Err(SelectionError::SelectionNeverMaterialized {
                    selection: handle.to_string(),
                })
            }
            Some(selection) => Ok(&selection.members),
        }
    }

    /// Remove the members of `to_remove` from selection `name`.
    ///
    /// Returns how many entities were removed.
    pub fn delete(&mut self, name: &str, to_remove: &str) -> Result<usize, SelectionError> {
        let removed: Vec<EntityRef> = self.resolve(to_remove)?.iter().cloned().collect();
        self.resolve(name)?;
        let key = self.key(name).ok_or_else(|| SelectionError::UnknownSelection {
            selection: self.handle(name),
        })?;
        let selection = self
            .selections
            .get_mut(&key)
            .ok_or(SelectionError::UnknownSelection { selection: key })?;
        let before = selection.members.len();
        selection.members.retain(|entity| !removed.contains(entity));
        Ok(before - selection.members.len())
    }

    pub fn selections(&self) -> impl Iterator<Item = &Selection> {
        self.selections.values()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dom(id: &str) -> EntityRef {
        EntityRef::domain(id)
    }

    fn ids(members: &Members) -> Vec<&str> {
        members.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = SelectionRegistry::new();
        reg.create_selection("CUFF_FINAL").unwrap();
        assert_eq!(
            reg.create_selection("CUFF_FINAL").unwrap_err(),
            SelectionError::DuplicateSelectionName {
                selection: "CUFF_FINAL".into()
            }
        );
    }

    #[test]
    fn test_declared_but_empty_is_not_materialized() {
        let mut reg = SelectionRegistry::new();
        reg.create_selection("HOLES").unwrap();
        assert!(matches!(
            reg.resolve("HOLES"),
            Err(SelectionError::SelectionNeverMaterialized { .. })
        ));
        reg.contribute("HOLES", Contribution::Entities(vec![])).unwrap();
        assert!(reg.resolve("HOLES").unwrap().is_empty());
    }

    #[test]
    fn test_contributions_accumulate() {
        let mut reg = SelectionRegistry::new();
        reg.create_selection("HOLES").unwrap();
        reg.contribute("HOLES", Contribution::Entities(vec![dom("econ1")]))
            .unwrap();
        reg.contribute("HOLES", Contribution::Entities(vec![dom("econ2"), dom("econ1")]))
            .unwrap();
        assert_eq!(ids(reg.resolve("HOLES").unwrap()), vec!["econ1", "econ2"]);
        assert_eq!(reg.get("HOLES").unwrap().source_op(), Some(SelectionOp::Primitive));
    }

    #[test]
    fn test_difference_and_union() {
        let mut reg = SelectionRegistry::new();
        for name in ["A", "B", "C", "D"] {
            reg.create_selection(name).unwrap();
        }
        reg.contribute("A", Contribution::Entities(vec![dom("e1"), dom("e2"), dom("e3")]))
            .unwrap();
        reg.contribute("B", Contribution::Entities(vec![dom("e2")])).unwrap();
        reg.contribute(
            "C",
            Contribution::Difference {
                primary: "A".into(),
                subtract: "B".into(),
            },
        )
        .unwrap();
        assert_eq!(ids(reg.resolve("C").unwrap()), vec!["e1", "e3"]);

        reg.contribute("D", Contribution::Union(vec!["B".into(), "C".into()]))
            .unwrap();
        assert_eq!(ids(reg.resolve("D").unwrap()), vec!["e2", "e1", "e3"]);
        assert_eq!(reg.get("D").unwrap().source_op(), Some(SelectionOp::Union));
    }

    #[test]
    fn test_difference_into_primary_narrows_it() {
        let mut reg = SelectionRegistry::new();
        reg.create_selection("A").unwrap();
        reg.create_selection("B").unwrap();
        reg.contribute("A", Contribution::Entities(vec![dom("e1"), dom("e2")]))
            .unwrap();
        reg.contribute("B", Contribution::Entities(vec![dom("e2")])).unwrap();
        let members = reg
            .contribute(
                "A",
                Contribution::Difference {
                    primary: "A".into(),
                    subtract: "B".into(),
                },
            )
            .unwrap();
        assert_eq!(ids(members), vec!["e1"]);
        assert_eq!(ids(reg.resolve("B").unwrap()), vec!["e2"]);
    }

    #[test]
    fn test_partition_replaces_split_entities_everywhere() {
        let mut reg = SelectionRegistry::new();
        for name in ["PRE", "OTHER", "FINAL"] {
            reg.create_selection(name).unwrap();
        }
        reg.contribute("PRE", Contribution::Entities(vec![dom("ext1")])).unwrap();
        reg.contribute("OTHER", Contribution::Entities(vec![dom("cyl1"), dom("ext1")]))
            .unwrap();
        reg.contribute(
            "FINAL",
            Contribution::Partition {
                domain: "PRE".into(),
                splits: vec![(dom("ext1"), vec![dom("ext1:1"), dom("ext1:2")])],
            },
        )
        .unwrap();

        assert_eq!(ids(reg.resolve("FINAL").unwrap()), vec!["ext1:1", "ext1:2"]);
        assert_eq!(ids(reg.resolve("PRE").unwrap()), vec!["ext1:1", "ext1:2"]);
        assert_eq!(
            ids(reg.resolve("OTHER").unwrap()),
            vec!["cyl1", "ext1:1", "ext1:2"]
        );
    }

    #[test]
    fn test_delete_removes_members() {
        let mut reg = SelectionRegistry::new();
        reg.create_selection("FINAL").unwrap();
        reg.create_selection("OVERSHOOT").unwrap();
        reg.contribute("FINAL", Contribution::Entities(vec![dom("a"), dom("b")]))
            .unwrap();
        reg.contribute("OVERSHOOT", Contribution::Entities(vec![dom("b")]))
            .unwrap();
        assert_eq!(reg.delete("FINAL", "OVERSHOOT").unwrap(), 1);
        assert_eq!(ids(reg.resolve("FINAL").unwrap()), vec!["a"]);
    }

    #[test]
    fn test_namespaced_handles() {
        let mut reg = SelectionRegistry::namespaced("pi1");
        reg.create_labelled("csel1", "CUFF_FINAL").unwrap();
        assert_eq!(reg.handle("csel1"), "pi1_csel1");
        reg.contribute("csel1", Contribution::Entities(vec![dom("cyl2")]))
            .unwrap();
        assert_eq!(reg.resolve_handle("pi1_csel1").unwrap().len(), 1);
        assert_eq!(reg.resolve("pi1_csel1").unwrap().len(), 1);
        assert_eq!(reg.get("csel1").unwrap().label(), Some("CUFF_FINAL"));
        assert!(matches!(
            reg.resolve_handle("csel1"),
            Err(SelectionError::UnknownSelection { .. })
        ));
    }
}
