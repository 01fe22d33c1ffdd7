//! What a caller asks the binder for

use indexmap::IndexMap;

/// A request to stamp out one part instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceRequest {
    /// Template name
    pub template: String,
    /// Parameter name -> expression source, e.g. `"Theta" -> "340 [deg]"`
    pub bindings: IndexMap<String, String>,
    /// Optional alias bound to the allocated instance identifier
    pub pseudonym: Option<String>,
    /// Per-instance overrides of selection keep flags, by selection label
    pub keep: IndexMap<String, bool>,
    /// Index of the cuff design this instance belongs to
    pub cuff_index: u32,
    /// Rebuild under this previously issued instance identifier instead of
    /// allocating a new one
    pub reuse: Option<String>,
}

impl InstanceRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    /// Bind a parameter to an expression
    pub fn bind(mut self, param: impl Into<String>, expression: impl Into<String>) -> Self {
        self.bindings.insert(param.into(), expression.into());
        self
    }

    pub fn with_pseudonym(mut self, pseudonym: impl Into<String>) -> Self {
        self.pseudonym = Some(pseudonym.into());
        self
    }

    /// Override whether a selection's entities are kept
    pub fn keep(mut self, selection: impl Into<String>, keep: bool) -> Self {
        self.keep.insert(selection.into(), keep);
        self
    }

    pub fn with_cuff_index(mut self, index: u32) -> Self {
        self.cuff_index = index;
        self
    }

    pub fn reusing(mut self, instance_id: impl Into<String>) -> Self {
        self.reuse = Some(instance_id.into());
        self
    }
}
