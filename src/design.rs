//! Per-design parameter tables and the design file format
//!
//! A design file lists cuff designs (Purdue, CorTec, ...). Each design has a
//! table of named parameter expressions and the part instances to build
//! from it:
//!
//! ```toml
//! [assembly]
//! fill_defaults = false
//!
//! [[design]]
//! name = "Purdue"
//! params = { R_in = "150 [um]", Theta = { expression = "340 [deg]", description = "cuff arc" } }
//!
//! [[design.instance]]
//! label = "TubeCuff"
//! template = "TubeCuff_Primitive"
//! bind = { Theta = "Theta", R_in = "R_in", N_holes = 0 }
//! keep = { CUFF_FINAL = true }
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::binder::InstanceRequest;
use crate::config::{AssemblyConfig, TomlAssembly};
use crate::expr::{Evaluator, Expr, ExprError, Resolved, Scope, Value};

#[derive(Error, Debug)]
pub enum DesignError {
    #[error("Failed to read design file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse design TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("parameter {param} of design {design}: {source}")]
    Parameter {
        design: String,
        param: String,
        #[source]
        source: ExprError,
    },
}

/// One named parameter of a design table
#[derive(Debug, Clone, PartialEq)]
pub struct DesignParam {
    pub name: String,
    pub expression: Expr,
    pub description: Option<String>,
}

/// Named parameter expressions of one cuff design.
///
/// Parameters may refer to each other; they are evaluated on demand when a
/// binding or a default is evaluated against the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignTable {
    name: String,
    params: IndexMap<String, DesignParam>,
}

impl DesignTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: IndexMap::new(),
        }
    }

    /// Add a parameter, replacing any previous definition of the same name
    pub fn insert(&mut self, param: DesignParam) -> Option<DesignParam> {
        self.params.insert(param.name.clone(), param)
    }

    /// Builder-style [`DesignTable::insert`] without a description
    pub fn with_param(mut self, name: impl Into<String>, expression: Expr) -> Self {
        let name = name.into();
        self.insert(DesignParam {
            name,
            expression,
            description: None,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&DesignParam> {
        self.params.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = &DesignParam> {
        self.params.values()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Evaluate every parameter, failing on the first that does not evaluate
    pub fn evaluate(&self, tolerance: f64) -> Result<IndexMap<String, Value>, DesignError> {
        let evaluator = Evaluator::new(tolerance).with_scope(self);
        self.params
            .values()
            .map(|param| {
                evaluator
                    .eval(&param.expression)
                    .map(|value| (param.name.clone(), value))
                    .map_err(|source| DesignError::Parameter {
                        design: self.name.clone(),
                        param: param.name.clone(),
                        source,
                    })
            })
            .collect()
    }
}

impl Scope for DesignTable {
    fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.params.get(name).map(|p| Resolved::Expr(&p.expression))
    }
}

/// A part instance a design asks for
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    /// Short name, used to build the instance pseudonym
    pub label: String,
    pub template: String,
    pub bind: IndexMap<String, String>,
    pub keep: IndexMap<String, bool>,
}

impl InstanceSpec {
    /// Request for this instance as part of cuff design `cuff_index`.
    ///
    /// The pseudonym is `"Cuff {cuff_index}_{label}"`.
    pub fn request(&self, cuff_index: u32) -> InstanceRequest {
        InstanceRequest {
            template: self.template.clone(),
            bindings: self.bind.clone(),
            pseudonym: Some(format!("Cuff {cuff_index}_{}", self.label)),
            keep: self.keep.clone(),
            cuff_index,
            reuse: None,
        }
    }
}

/// A design table together with the instances to build from it
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub table: DesignTable,
    pub instances: Vec<InstanceSpec>,
}

impl Design {
    pub fn name(&self) -> &str {
        self.table.name()
    }
}

/// A parsed design file
#[derive(Debug, Clone, PartialEq)]
pub struct DesignFile {
    pub assembly: AssemblyConfig,
    pub designs: Vec<Design>,
}

/// TOML structure for deserializing design files
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDesignFile {
    #[serde(default)]
    assembly: TomlAssembly,
    #[serde(default, rename = "design")]
    designs: Vec<TomlDesign>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDesign {
    name: String,
    #[serde(default)]
    params: IndexMap<String, TomlParam>,
    #[serde(default, rename = "instance")]
    instances: Vec<TomlInstance>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TomlParam {
    Bare(TomlExpr),
    Detailed {
        expression: TomlExpr,
        description: Option<String>,
    },
}

/// Expressions may be written as strings or as plain TOML numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum TomlExpr {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl TomlExpr {
    fn into_source(self) -> String {
        match self {
            TomlExpr::Text(text) => text,
            TomlExpr::Integer(n) => n.to_string(),
            TomlExpr::Float(x) => x.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlInstance {
    label: String,
    template: String,
    #[serde(default)]
    bind: IndexMap<String, TomlExpr>,
    #[serde(default)]
    keep: IndexMap<String, bool>,
}

impl DesignFile {
    /// Load a design file from disk
    pub fn from_file(path: &Path) -> Result<Self, DesignError> {
        let content = std::fs::read_to_string(path).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse a design file; every parameter expression must parse
    pub fn from_str(content: &str) -> Result<Self, DesignError> {
        let parsed: TomlDesignFile = toml::from_str(content)?;

        let designs = parsed
            .designs
            .into_iter()
            .map(|design| {
                let mut table = DesignTable::new(design.name);
                for (name, param) in design.params {
                    let (text, description) = match param {
                        TomlParam::Bare(expr) => (expr.into_source(), None),
                        TomlParam::Detailed {
                            expression,
                            description,
                        } => (expression.into_source(), description),
                    };
                    let expression = text.parse::<Expr>().map_err(|source| DesignError::Parameter {
                        design: table.name().to_string(),
                        param: name.clone(),
                        source,
                    })?;
                    table.insert(DesignParam {
                        name,
                        expression,
                        description,
                    });
                }
                let instances = design
                    .instances
                    .into_iter()
                    .map(|instance| InstanceSpec {
                        label: instance.label,
                        template: instance.template,
                        bind: instance
                            .bind
                            .into_iter()
                            .map(|(param, expr)| (param, expr.into_source()))
                            .collect(),
                        keep: instance.keep,
                    })
                    .collect();
                Ok::<_, DesignError>(Design { table, instances })
            })
            .collect::<Result<Vec<_>, DesignError>>()?;

        Ok(DesignFile {
            assembly: parsed.assembly.into_config(),
            designs,
        })
    }
}
