//! Configuration for part assembly

use serde::Deserialize;

use crate::expr::DEFAULT_TOLERANCE;

/// Configuration options for instantiating templates
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyConfig {
    /// Fill parameters missing from an instance request with template defaults
    pub fill_defaults: bool,

    /// Identifier category for part instances
    pub instance_category: String,

    /// Identifier category for design parameter groups
    pub parameter_category: String,

    /// Identifier category for point current sources
    pub source_category: String,

    /// Relative tolerance for numeric equality in predicates
    pub tolerance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            fill_defaults: false,
            instance_category: "pi".to_string(),
            parameter_category: "par".to_string(),
            source_category: "pcs".to_string(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl AssemblyConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill missing parameters with template defaults
    pub fn with_fill_defaults(mut self, fill: bool) -> Self {
        self.fill_defaults = fill;
        self
    }

    /// Set the predicate equality tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the identifier category for part instances
    pub fn with_instance_category(mut self, category: impl Into<String>) -> Self {
        self.instance_category = category.into();
        self
    }
}

/// `[assembly]` table of a design file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlAssembly {
    fill_defaults: Option<bool>,
    instance_category: Option<String>,
    parameter_category: Option<String>,
    source_category: Option<String>,
    tolerance: Option<f64>,
}

impl TomlAssembly {
    pub(crate) fn into_config(self) -> AssemblyConfig {
        let defaults = AssemblyConfig::default();
        AssemblyConfig {
            fill_defaults: self.fill_defaults.unwrap_or(defaults.fill_defaults),
            instance_category: self.instance_category.unwrap_or(defaults.instance_category),
            parameter_category: self.parameter_category.unwrap_or(defaults.parameter_category),
            source_category: self.source_category.unwrap_or(defaults.source_category),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
        }
    }
}
