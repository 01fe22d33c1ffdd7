//! Per-category identifier counters and the pseudonym table

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::IdentError;

/// A source-bearing selection registered for downstream solution stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSource {
    /// Identifier of the point current source feature (e.g. "pcs1")
    pub pcs: String,
    /// Human-readable name, "Cuff {index}_{label}" for driver-built instances
    pub name: String,
    /// Index of the cuff design the source belongs to
    pub cuff_index: u32,
}

/// Hands out identifiers of the form `{category}{n}` with `n` starting at 1.
///
/// Counters only move forward. A pseudonym is a caller-chosen alias that
/// can be bound to exactly one identifier for the lifetime of the
/// allocator (or of the snapshot it is persisted into).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierAllocator {
    #[serde(rename = "identifierStates")]
    counters: IndexMap<String, u32>,
    #[serde(rename = "identifierPseudonyms")]
    pseudonyms: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    #[serde(
        rename = "currentIDs",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    current_sources: BTreeMap<u32, CurrentSource>,
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier in `category`
    pub fn next(&mut self, category: &str) -> String {
        let counter = self.counters.entry(category.to_string()).or_insert(0);
        *counter += 1;
        let id = format!("{category}{counter}");
        trace!(category, id = %id, "allocated identifier");
        id
    }

    /// Allocate the next identifier in `category` and bind `pseudonym` to it.
    ///
    /// The counter advances even when the pseudonym is already taken, so a
    /// rejected request still consumes its number.
    pub fn next_with_pseudonym(
        &mut self,
        category: &str,
        pseudonym: &str,
    ) -> Result<String, IdentError> {
        let id = self.next(category);
        if let Some(existing) = self.pseudonyms.get(pseudonym) {
            warn!(pseudonym, existing = %existing, rejected = %id, "pseudonym already bound");
            return Err(IdentError::DuplicatePseudonym {
                pseudonym: pseudonym.to_string(),
                existing: existing.clone(),
                rejected: id,
            });
        }
        self.pseudonyms.insert(pseudonym.to_string(), id.clone());
        Ok(id)
    }

    /// Look up the identifier bound to `pseudonym`
    pub fn get(&self, pseudonym: &str) -> Option<&str> {
        match self.pseudonyms.get(pseudonym) {
            Some(id) => Some(id.as_str()),
            None => {
                warn!(pseudonym, "no identifier bound to pseudonym");
                None
            }
        }
    }

    pub fn has_pseudonym(&self, pseudonym: &str) -> bool {
        self.pseudonyms.contains_key(pseudonym)
    }

    /// Identifier bound to `pseudonym`, without logging a miss
    pub fn bound(&self, pseudonym: &str) -> Option<&str> {
        self.pseudonyms.get(pseudonym).map(String::as_str)
    }

    /// Whether `id` is `{category}{n}` with `n` already handed out
    pub fn is_issued(&self, category: &str, id: &str) -> bool {
        id.strip_prefix(category)
            .and_then(|n| n.parse::<u32>().ok())
            .is_some_and(|n| n >= 1 && n <= self.counter(category))
    }

    /// Take up an identifier issued earlier instead of minting a new one.
    ///
    /// The counter does not move. A pseudonym must either already point at
    /// `id` or be unbound, in which case it is bound to `id`.
    pub fn reuse(
        &mut self,
        category: &str,
        id: &str,
        pseudonym: Option<&str>,
    ) -> Result<(), IdentError> {
        if !self.is_issued(category, id) {
            return Err(IdentError::NotIssued {
                category: category.to_string(),
                id: id.to_string(),
            });
        }
        if let Some(alias) = pseudonym {
            match self.pseudonyms.get(alias) {
                Some(existing) if existing != id => {
                    return Err(IdentError::PseudonymMismatch {
                        pseudonym: alias.to_string(),
                        existing: existing.clone(),
                        requested: id.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    self.pseudonyms.insert(alias.to_string(), id.to_string());
                }
            }
        }
        trace!(category, id, "reused identifier");
        Ok(())
    }

    /// Total number of identifiers handed out across all categories
    pub fn count(&self) -> u32 {
        self.counters.values().sum()
    }

    /// Current counter value for `category` (0 if never used)
    pub fn counter(&self, category: &str) -> u32 {
        self.counters.get(category).copied().unwrap_or(0)
    }

    /// Categories in first-use order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.counters.keys().map(String::as_str)
    }

    /// (pseudonym, identifier) pairs in binding order
    pub fn pseudonyms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pseudonyms
            .iter()
            .map(|(alias, id)| (alias.as_str(), id.as_str()))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Remember a display label (selection labels of a template, in declaration order)
    pub fn push_label(&mut self, label: impl Into<String>) {
        self.labels.push(label.into());
    }

    /// Register a current source; returns its 1-based index in the table
    pub fn record_current_source(&mut self, source: CurrentSource) -> u32 {
        let index = self
            .current_sources
            .keys()
            .next_back()
            .map_or(1, |last| last + 1);
        self.current_sources.insert(index, source);
        index
    }

    pub fn current_sources(&self) -> impl Iterator<Item = (u32, &CurrentSource)> {
        self.current_sources
            .iter()
            .map(|(index, source)| (*index, source))
    }

    pub(crate) fn counters(&self) -> &IndexMap<String, u32> {
        &self.counters
    }

    pub(crate) fn raw_pseudonyms(&self) -> &IndexMap<String, String> {
        &self.pseudonyms
    }
}

/// Anything that can mint identifiers for the instance binder
pub trait IdSource {
    /// Allocate the next identifier in `category`, optionally binding a pseudonym
    fn allocate(&mut self, category: &str, pseudonym: Option<&str>) -> Result<String, IdentError>;

    /// Take up an identifier issued earlier; see [`IdentifierAllocator::reuse`]
    fn reuse(&mut self, category: &str, id: &str, pseudonym: Option<&str>) -> Result<(), IdentError>;

    /// Identifier already bound to `pseudonym`
    fn bound(&self, pseudonym: &str) -> Option<String>;

    /// Register a current source in the allocator's source table
    fn record_current_source(&mut self, source: CurrentSource) -> u32;
}

impl IdSource for IdentifierAllocator {
    fn allocate(&mut self, category: &str, pseudonym: Option<&str>) -> Result<String, IdentError> {
        match pseudonym {
            Some(alias) => self.next_with_pseudonym(category, alias),
            None => Ok(self.next(category)),
        }
    }

    fn reuse(&mut self, category: &str, id: &str, pseudonym: Option<&str>) -> Result<(), IdentError> {
        IdentifierAllocator::reuse(self, category, id, pseudonym)
    }

    fn bound(&self, pseudonym: &str) -> Option<String> {
        IdentifierAllocator::bound(self, pseudonym).map(str::to_string)
    }

    fn record_current_source(&mut self, source: CurrentSource) -> u32 {
        IdentifierAllocator::record_current_source(self, source)
    }
}
