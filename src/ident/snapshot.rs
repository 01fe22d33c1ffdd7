//! JSON persistence for allocator state
//!
//! The snapshot layout is the one downstream solution stages read:
//!
//! ```json
//! {
//!   "identifierStates": { "pi": 2, "par": 1 },
//!   "identifierPseudonyms": { "Purdue": "par1" },
//!   "currentIDs": { "1": { "pcs": "pcs1", "name": "Cuff 0_SRC", "cuff_index": 0 } }
//! }
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::IdentifierAllocator;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed identifier snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error accessing snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("inconsistent snapshot: pseudonym '{pseudonym}' points at '{identifier}', {reason}")]
    Inconsistent {
        pseudonym: String,
        identifier: String,
        reason: String,
    },
}

impl IdentifierAllocator {
    /// Serialize the full allocator state
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore allocator state, rejecting snapshots whose pseudonyms point
    /// past their category counter
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let allocator: Self = serde_json::from_str(json)?;
        allocator.validate()?;
        debug!(
            categories = allocator.counters().len(),
            pseudonyms = allocator.raw_pseudonyms().len(),
            "restored identifier snapshot"
        );
        Ok(allocator)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        for (pseudonym, identifier) in self.raw_pseudonyms() {
            let issued = self.counters().iter().any(|(category, counter)| {
                identifier
                    .strip_prefix(category.as_str())
                    .and_then(|suffix| suffix.parse::<u32>().ok())
                    .is_some_and(|n| n >= 1 && n <= *counter)
            });
            if !issued {
                return Err(SnapshotError::Inconsistent {
                    pseudonym: pseudonym.clone(),
                    identifier: identifier.clone(),
                    reason: "which was never issued by any category counter".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::CurrentSource;

    #[test]
    fn test_snapshot_layout() {
        let mut ids = IdentifierAllocator::new();
        ids.next_with_pseudonym("par", "Purdue").unwrap();
        ids.next_with_pseudonym("pi", "Cuff 0_TubeCuff").unwrap();
        ids.next("pi");

        insta::assert_snapshot!(ids.to_json().unwrap(), @r###"
        {
          "identifierStates": {
            "par": 1,
            "pi": 2
          },
          "identifierPseudonyms": {
            "Purdue": "par1",
            "Cuff 0_TubeCuff": "pi1"
          }
        }
        "###);
    }

    #[test]
    fn test_restore_continues_counting() {
        let mut ids = IdentifierAllocator::new();
        ids.next("pi");
        ids.next_with_pseudonym("pi", "second").unwrap();
        let pcs = ids.next("pcs");
        ids.record_current_source(CurrentSource {
            pcs,
            name: "Cuff 0_SRC".into(),
            cuff_index: 0,
        });

        let mut restored = IdentifierAllocator::from_json(&ids.to_json().unwrap()).unwrap();
        assert_eq!(restored, ids);
        assert_eq!(restored.next("pi"), "pi3");
        assert_eq!(restored.get("second"), Some("pi2"));
    }

    #[test]
    fn test_rejects_pseudonym_beyond_counter() {
        let json = r#"{
            "identifierStates": { "pi": 1 },
            "identifierPseudonyms": { "late": "pi4" }
        }"#;
        let err = IdentifierAllocator::from_json(json).unwrap_err();
        assert!(matches!(err, SnapshotError::Inconsistent { ref identifier, .. } if identifier == "pi4"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            IdentifierAllocator::from_json("{ not json"),
            Err(SnapshotError::Json(_))
        ));
    }
}
